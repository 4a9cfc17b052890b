//! Execution unit providers
//!
//! An execution unit is a [`Session`]. Invocations obtain one through a [`UnitLease`],
//! whose `Drop` hands the session back to its provider exactly once. Two strategies
//! exist:
//!
//! - [`FreshUnits`] creates a new session per invocation and destroys it afterwards.
//! - [`PooledUnits`] resets and reuses sessions. Imported module objects survive
//!   reuse, so state hidden in a module could in principle leak between scripts run
//!   on the same unit; sessions that failed or were interrupted are never reused.

use crate::config::UnitStrategy;
use pyscript_runtime::{CapabilityPolicy, Session, SessionControl, SessionError, SessionPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Acquisition counters shared by a provider and its leases
#[derive(Debug, Default)]
pub struct UnitStats {
    acquired: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`UnitStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitStatsSnapshot {
    pub acquired: u64,
    /// Units handed back healthy
    pub released: u64,
    /// Units torn down after a failure, interruption or timeout
    pub discarded: u64,
}

impl UnitStatsSnapshot {
    /// Leases not yet dropped
    pub fn in_flight(&self) -> u64 {
        self.acquired
            .saturating_sub(self.released)
            .saturating_sub(self.discarded)
    }
}

impl UnitStats {
    pub fn snapshot(&self) -> UnitStatsSnapshot {
        UnitStatsSnapshot {
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

pub trait UnitProvider: Send + Sync {
    fn strategy(&self) -> UnitStrategy;

    /// Produce a session ready for one evaluation
    fn checkout(&self) -> Session;

    /// Take a session back. `healthy` is false when the session must not be reused.
    fn checkin(&self, session: Session, healthy: bool);

    fn stats(&self) -> &UnitStats;
}

/// Build the provider for a configured strategy
pub fn provider_for(
    strategy: UnitStrategy,
    pooled_capacity: usize,
    policy: Arc<CapabilityPolicy>,
) -> Arc<dyn UnitProvider> {
    match strategy {
        UnitStrategy::Fresh => Arc::new(FreshUnits::new(policy)),
        UnitStrategy::Pooled => Arc::new(PooledUnits::new(pooled_capacity, policy)),
    }
}

/// One new session per invocation
pub struct FreshUnits {
    policy: Arc<CapabilityPolicy>,
    stats: UnitStats,
}

impl FreshUnits {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self {
            policy,
            stats: UnitStats::default(),
        }
    }
}

impl UnitProvider for FreshUnits {
    fn strategy(&self) -> UnitStrategy {
        UnitStrategy::Fresh
    }

    fn checkout(&self) -> Session {
        Session::new(Arc::clone(&self.policy))
    }

    fn checkin(&self, session: Session, _healthy: bool) {
        session.close();
    }

    fn stats(&self) -> &UnitStats {
        &self.stats
    }
}

/// Reset-and-reuse sessions with exclusive checkout
pub struct PooledUnits {
    pool: SessionPool,
    stats: UnitStats,
}

impl PooledUnits {
    pub fn new(capacity: usize, policy: Arc<CapabilityPolicy>) -> Self {
        Self {
            pool: SessionPool::new(capacity, policy),
            stats: UnitStats::default(),
        }
    }

    /// Sessions waiting for reuse
    pub fn idle(&self) -> usize {
        self.pool.idle()
    }
}

impl UnitProvider for PooledUnits {
    fn strategy(&self) -> UnitStrategy {
        UnitStrategy::Pooled
    }

    fn checkout(&self) -> Session {
        self.pool.checkout()
    }

    fn checkin(&self, session: Session, healthy: bool) {
        if !healthy {
            session.close();
            return;
        }
        self.pool.checkin(session);
    }

    fn stats(&self) -> &UnitStats {
        &self.stats
    }
}

impl Drop for PooledUnits {
    fn drop(&mut self) {
        self.pool.drain();
    }
}

/// Exclusive use of one execution unit for one evaluation
pub struct UnitLease {
    session: Option<Session>,
    control: Arc<SessionControl>,
    provider: Arc<dyn UnitProvider>,
    poisoned: bool,
}

impl UnitLease {
    pub fn acquire(provider: Arc<dyn UnitProvider>) -> Self {
        let session = provider.checkout();
        provider.stats().acquired.fetch_add(1, Ordering::SeqCst);
        debug!(
            session = session.id(),
            strategy = ?provider.strategy(),
            "execution unit acquired"
        );
        Self {
            control: session.control(),
            session: Some(session),
            provider,
            poisoned: false,
        }
    }

    /// Handle used to interrupt or tear down the unit from outside the worker
    pub fn control(&self) -> Arc<SessionControl> {
        Arc::clone(&self.control)
    }

    pub fn session(&mut self) -> Result<&mut Session, SessionError> {
        self.session.as_mut().ok_or(SessionError::Closed)
    }

    /// Mark the unit as unfit for reuse
    pub fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl Drop for UnitLease {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let healthy = !self.poisoned
            && !std::thread::panicking()
            && !self.control.is_closed()
            && !self.control.is_interrupted();
        let counter = if healthy {
            &self.provider.stats().released
        } else {
            &self.provider.stats().discarded
        };
        counter.fetch_add(1, Ordering::SeqCst);
        debug!(session = session.id(), healthy, "execution unit released");
        self.provider.checkin(session, healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyscript_runtime::Value;

    fn policy() -> Arc<CapabilityPolicy> {
        Arc::new(CapabilityPolicy::default())
    }

    #[test]
    fn test_fresh_units_never_reuse() {
        let provider: Arc<dyn UnitProvider> = Arc::new(FreshUnits::new(policy()));
        let first = {
            let mut lease = UnitLease::acquire(Arc::clone(&provider));
            lease.session().unwrap().id()
        };
        let mut lease = UnitLease::acquire(Arc::clone(&provider));
        assert_ne!(lease.session().unwrap().id(), first);
        drop(lease);

        let stats = provider.stats().snapshot();
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 2);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_pooled_units_reuse_after_reset() {
        let pooled = Arc::new(PooledUnits::new(2, policy()));
        let provider: Arc<dyn UnitProvider> = pooled.clone();

        let first = {
            let mut lease = UnitLease::acquire(Arc::clone(&provider));
            let session = lease.session().unwrap();
            session.eval_source("leak = 1").unwrap();
            session.id()
        };
        assert_eq!(pooled.idle(), 1);

        let mut lease = UnitLease::acquire(Arc::clone(&provider));
        let session = lease.session().unwrap();
        assert_eq!(session.id(), first);
        assert!(session.get_global("leak").is_none());
        assert_eq!(session.eval_source("2 * 3").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_poisoned_lease_is_discarded() {
        let pooled = Arc::new(PooledUnits::new(2, policy()));
        let provider: Arc<dyn UnitProvider> = pooled.clone();
        {
            let mut lease = UnitLease::acquire(Arc::clone(&provider));
            lease.poison();
        }
        assert_eq!(pooled.idle(), 0);
        let stats = provider.stats().snapshot();
        assert_eq!((stats.acquired, stats.released, stats.discarded), (1, 0, 1));
    }

    #[test]
    fn test_interrupted_unit_is_discarded() {
        let pooled = Arc::new(PooledUnits::new(2, policy()));
        let provider: Arc<dyn UnitProvider> = pooled.clone();
        let lease = UnitLease::acquire(Arc::clone(&provider));
        lease.control().interrupt();
        drop(lease);
        assert_eq!(pooled.idle(), 0);
        assert_eq!(provider.stats().snapshot().discarded, 1);
    }
}
