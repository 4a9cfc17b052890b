//! Reusable session pool
//!
//! Sessions returned to the pool are reset before reuse, so no global survives from one
//! checkout to the next. Interrupted or closed sessions are never returned to the pool.

use crate::policy::CapabilityPolicy;
use crate::session::Session;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct SessionPool {
    idle: Mutex<Vec<Session>>,
    capacity: usize,
    policy: Arc<CapabilityPolicy>,
    created: AtomicU64,
}

impl SessionPool {
    pub fn new(capacity: usize, policy: Arc<CapabilityPolicy>) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            policy,
            created: AtomicU64::new(0),
        }
    }

    /// Take an idle session, or create one when none is idle.
    ///
    /// Sessions closed while idle are skipped.
    pub fn checkout(&self) -> Session {
        {
            let mut idle = self.idle.lock();
            while let Some(session) = idle.pop() {
                if !session.is_closed() {
                    return session;
                }
                debug!(session = session.id(), "skipping closed idle session");
            }
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Session::new(Arc::clone(&self.policy))
    }

    /// Return a session. Returns `false` when the session was discarded instead.
    pub fn checkin(&self, mut session: Session) -> bool {
        let control = session.control();
        if control.is_interrupted() || control.is_closed() {
            debug!(session = session.id(), "discarding tainted session");
            session.close();
            return false;
        }

        session.reset();
        let mut idle = self.idle.lock();
        if idle.len() >= self.capacity {
            return false;
        }
        idle.push(session);
        true
    }

    /// Number of sessions waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total sessions this pool has created
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Close every idle session and empty the pool
    pub fn drain(&self) {
        for session in self.idle.lock().drain(..) {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn pool(capacity: usize) -> SessionPool {
        SessionPool::new(capacity, Arc::new(CapabilityPolicy::default()))
    }

    #[test]
    fn test_reuse_does_not_leak_globals() {
        let pool = pool(2);
        let mut s = pool.checkout();
        let id = s.id();
        s.eval_source("secret = 42").unwrap();
        assert!(pool.checkin(s));

        let mut s = pool.checkout();
        assert_eq!(s.id(), id);
        assert!(s.get_global("secret").is_none());
        assert_eq!(s.eval_source("1 + 1").unwrap(), Value::Int(2));
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_interrupted_session_is_discarded() {
        let pool = pool(2);
        let s = pool.checkout();
        s.control().interrupt();
        assert!(!pool.checkin(s));
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_capacity_bound() {
        let pool = pool(1);
        let a = pool.checkout();
        let b = pool.checkout();
        assert!(pool.checkin(a));
        assert!(!pool.checkin(b));
        assert_eq!(pool.idle(), 1);

        pool.drain();
        assert_eq!(pool.idle(), 0);
    }
}
