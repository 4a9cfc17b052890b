//! Bounded worker pool for blocking evaluations
//!
//! Submissions wait for a free slot (backpressure). A slot stays taken until the
//! worker thread really returns, so a task that ignores interruption keeps its slot
//! rather than letting the pool grow past its size. Each task runs on its own named
//! thread with an explicit stack size, since evaluation recurses on the native stack.

use crate::error::PoolError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{Semaphore, oneshot};
use tracing::trace;

/// Stack given to each worker thread unless configured otherwise
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;

const MIN_STACK_SIZE: usize = 256 * 1024;

#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    stack_size: usize,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: name.into(),
            size,
            stack_size: DEFAULT_STACK_SIZE,
            slots: Arc::new(Semaphore::new(size)),
        }
    }

    /// Set the worker thread stack size in bytes
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes.max(MIN_STACK_SIZE);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Slots not currently held by a task
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a slot, then run `task` on a dedicated worker thread
    pub async fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed(self.name.clone()))?;
        trace!(pool = %self.name, available = self.available(), "task submitted");

        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name(format!("{}-worker", self.name))
            .stack_size(self.stack_size)
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(task));
                drop(permit);
                let _ = tx.send(outcome);
            })
            .map_err(|err| PoolError::Spawn(err.to_string()))?;
        Ok(TaskHandle { outcome: rx })
    }

    /// Refuse further submissions. Running tasks are unaffected.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

/// Handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle<T> {
    outcome: oneshot::Receiver<std::thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task to return
    pub async fn join(&mut self) -> Result<T, PoolError> {
        match (&mut self.outcome).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(PoolError::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(PoolError::Cancelled),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_and_join() {
        let pool = WorkerPool::new("test", 2);
        let mut handle = pool.submit(|| 40 + 2).await.unwrap();
        assert_eq!(handle.join().await.unwrap(), 42);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_slot_held_until_task_returns() {
        let pool = WorkerPool::new("test", 1);
        let mut handle = pool
            .submit(|| std::thread::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(pool.available(), 0);

        let queued = tokio::time::timeout(Duration::from_millis(20), pool.submit(|| ())).await;
        assert!(queued.is_err(), "second submission should wait for the slot");

        handle.join().await.unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let pool = WorkerPool::new("test", 1);
        let mut handle = pool.submit(|| -> u32 { panic!("boom") }).await.unwrap();
        match handle.join().await {
            Err(PoolError::Panicked(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_workers_run_on_named_threads_with_configured_stack() {
        let pool = WorkerPool::new("scripts", 1).with_stack_size(8 * 1024 * 1024);
        assert_eq!(pool.stack_size(), 8 * 1024 * 1024);
        let mut handle = pool
            .submit(|| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(handle.join().await.unwrap().as_deref(), Some("scripts-worker"));

        assert_eq!(WorkerPool::new("tiny", 1).with_stack_size(1).stack_size(), MIN_STACK_SIZE);
    }

    #[tokio::test]
    async fn test_deep_native_recursion_fits_default_stack() {
        fn depth(n: u64) -> u64 {
            let pad = std::hint::black_box([0u8; 1024]);
            if n == 0 { pad[0] as u64 } else { 1 + depth(n - 1) }
        }
        let pool = WorkerPool::new("test", 1);
        let mut handle = pool.submit(|| depth(16 * 1024)).await.unwrap();
        assert_eq!(handle.join().await.unwrap(), 16 * 1024);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_submissions() {
        let pool = WorkerPool::new("test", 1);
        pool.close();
        assert!(matches!(pool.submit(|| ()).await, Err(PoolError::Closed(_))));
    }
}
