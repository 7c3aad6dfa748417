//! Dedicated runtime for asynchronous reads with callbacks.

use std::fmt;
use std::future::Future;

use tokio::runtime::{Builder, Runtime};
use tracing::warn;

use crate::error::BackendError;

pub(crate) const THREAD_NAME: &str = "data-access-callback";

/// Runs callback-style reads off the caller's runtime.
pub(crate) struct CallbackPool {
    runtime: Option<Runtime>,
    workers: usize,
}

impl CallbackPool {
    pub(crate) fn new(workers: usize) -> Result<Self, BackendError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| BackendError::Internal {
                backend_name: "callback-pool".to_string(),
                message: format!("Failed to start callback runtime: {}", e),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    /// Schedules `task`; returns false if the pool has shut down.
    pub(crate) fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(task);
                true
            }
            None => {
                warn!(
                    workers = self.workers,
                    "Callback pool has shut down; dropping callback task"
                );
                false
            }
        }
    }

    #[cfg(test)]
    fn shut_down(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for CallbackPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl Drop for CallbackPool {
    // Dropping a runtime blocks, which panics inside another runtime.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_spawn_runs_on_named_thread() {
        let pool = CallbackPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        assert!(pool.spawn(async move {
            let _ = tx.send(std::thread::current().name().map(String::from));
        }));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(THREAD_NAME));
    }

    #[test]
    fn test_spawn_after_shutdown_reports_dropped_task() {
        let mut pool = CallbackPool::new(1).unwrap();
        pool.shut_down();
        assert!(!pool.spawn(async {}));
    }
}
