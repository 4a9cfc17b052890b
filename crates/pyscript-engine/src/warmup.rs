//! Startup warmup and readiness
//!
//! `NotStarted -> Warming -> Ready | Failed`. Transitions are published on a watch
//! channel so callers can wait for a terminal state instead of racing startup.

use crate::error::WarmupError;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    NotStarted,
    Warming,
    Ready,
    Failed(String),
}

impl Readiness {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Readiness::Ready | Readiness::Failed(_))
    }
}

#[derive(Debug)]
pub struct Warmup {
    state: watch::Sender<Readiness>,
}

impl Default for Warmup {
    fn default() -> Self {
        Self::new()
    }
}

impl Warmup {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Readiness::NotStarted);
        Self { state }
    }

    pub fn readiness(&self) -> Readiness {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.state.subscribe()
    }

    /// Claim the warmup. Only the first call returns `true`.
    pub fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == Readiness::NotStarted {
                *state = Readiness::Warming;
                true
            } else {
                false
            }
        })
    }

    pub fn finish(&self, outcome: Result<(), String>) {
        self.state.send_replace(match outcome {
            Ok(()) => Readiness::Ready,
            Err(reason) => Readiness::Failed(reason),
        });
    }

    /// Wait until warmup reaches a terminal state.
    ///
    /// Fails immediately when warmup was never started.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), WarmupError> {
        let mut rx = self.subscribe();
        if *rx.borrow() == Readiness::NotStarted {
            return Err(WarmupError::NotStarted);
        }
        let state = tokio::time::timeout(timeout, rx.wait_for(Readiness::is_terminal))
            .await
            .map_err(|_| WarmupError::Timeout(timeout))?
            .map(|state| state.clone())
            .map_err(|_| WarmupError::Failed("readiness channel closed".to_string()))?;

        match state {
            Readiness::Failed(reason) => Err(WarmupError::Failed(reason)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_begin_is_idempotent() {
        let warmup = Warmup::new();
        assert_eq!(warmup.readiness(), Readiness::NotStarted);
        assert!(warmup.begin());
        assert!(!warmup.begin());
        assert_eq!(warmup.readiness(), Readiness::Warming);
    }

    #[test]
    fn test_wait_fails_fast_when_not_started() {
        let warmup = Warmup::new();
        assert_eq!(
            tokio_test::block_on(warmup.wait_ready(Duration::from_secs(10))),
            Err(WarmupError::NotStarted)
        );
    }

    #[tokio::test]
    async fn test_wait_sees_completion() {
        let warmup = Arc::new(Warmup::new());
        warmup.begin();
        let finisher = Arc::clone(&warmup);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finisher.finish(Ok(()));
        });
        warmup.wait_ready(Duration::from_secs(5)).await.unwrap();
        assert_eq!(warmup.readiness(), Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_reports_failure() {
        let warmup = Warmup::new();
        warmup.begin();
        assert_eq!(
            warmup.wait_ready(Duration::from_secs(60)).await,
            Err(WarmupError::Timeout(Duration::from_secs(60)))
        );
        warmup.finish(Err("backend unavailable".into()));
        assert_eq!(
            warmup.wait_ready(Duration::from_millis(20)).await,
            Err(WarmupError::Failed("backend unavailable".into()))
        );
    }
}
