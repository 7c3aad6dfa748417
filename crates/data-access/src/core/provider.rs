//! Lazily created, shared backend handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::BackendError;

/// Establishes a handle for a namespace (keyspace or index).
#[async_trait]
pub trait Connector<H: ?Sized + Send + Sync>: Send + Sync {
    /// Connects once; failures are reported, never retried here.
    async fn connect(&self, namespace: &str) -> Result<Arc<H>, BackendError>;
}

/// Hands out the same handle for every namespace.
pub struct SharedConnector<H: ?Sized> {
    handle: Arc<H>,
}

impl<H: ?Sized> SharedConnector<H> {
    /// Wraps an existing handle.
    pub fn new(handle: Arc<H>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl<H: ?Sized + Send + Sync> Connector<H> for SharedConnector<H> {
    async fn connect(&self, _namespace: &str) -> Result<Arc<H>, BackendError> {
        Ok(Arc::clone(&self.handle))
    }
}

/// One handle per namespace, created on first use and reused afterwards.
///
/// Lookups take a read lock only. First use goes through an async gate
/// and re-checks the cache, so concurrent first callers share a single
/// `connect`.
pub struct HandlePool<H: ?Sized + Send + Sync> {
    connector: Arc<dyn Connector<H>>,
    handles: RwLock<HashMap<String, Arc<H>>>,
    init: Mutex<()>,
}

impl<H: ?Sized + Send + Sync> HandlePool<H> {
    /// Creates an empty pool.
    pub fn new(connector: Arc<dyn Connector<H>>) -> Self {
        Self {
            connector,
            handles: RwLock::new(HashMap::new()),
            init: Mutex::new(()),
        }
    }

    /// Creates a pool that serves `handle` for every namespace.
    pub fn shared(handle: Arc<H>) -> Self
    where
        H: 'static,
    {
        Self::new(Arc::new(SharedConnector::new(handle)))
    }

    /// Returns the handle for `namespace`, connecting on first use.
    pub async fn get(&self, namespace: &str) -> Result<Arc<H>, BackendError> {
        if let Some(handle) = self.cached(namespace) {
            return Ok(handle);
        }

        let _gate = self.init.lock().await;
        if let Some(handle) = self.cached(namespace) {
            return Ok(handle);
        }

        let handle = self.connector.connect(namespace).await?;
        self.handles
            .write()
            .insert(namespace.to_string(), Arc::clone(&handle));
        info!(namespace, "Created backend handle");
        Ok(handle)
    }

    fn cached(&self, namespace: &str) -> Option<Arc<H>> {
        self.handles.read().get(namespace).cloned()
    }

    /// Number of namespaces with a live handle.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Returns true if no handle has been created yet.
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

impl<H: ?Sized + Send + Sync> fmt::Debug for HandlePool<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut namespaces: Vec<String> = self.handles.read().keys().cloned().collect();
        namespaces.sort();
        f.debug_struct("HandlePool")
            .field("namespaces", &namespaces)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Handle(String);

    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector<Handle> for CountingConnector {
        async fn connect(&self, namespace: &str) -> Result<Arc<Handle>, BackendError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if namespace == "broken" {
                return Err(BackendError::ConnectionFailed {
                    backend_name: "test".to_string(),
                    namespace: namespace.to_string(),
                    message: "no contact points".to_string(),
                });
            }
            Ok(Arc::new(Handle(namespace.to_string())))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_handle_under_concurrent_first_use() {
        let connector = Arc::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let pool = Arc::new(HandlePool::<Handle>::new(connector.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.get("app").await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(handles[0].0, "app");
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_not_cached() {
        let connector = Arc::new(CountingConnector {
            connects: AtomicUsize::new(0),
        });
        let pool = HandlePool::<Handle>::new(connector.clone());

        assert!(pool.get("broken").await.is_err());
        assert!(pool.get("broken").await.is_err());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_shared_connector_same_handle() {
        let pool = HandlePool::shared(Arc::new(Handle("shared".to_string())));
        let a = pool.get("ks1").await.unwrap();
        let b = pool.get("ks2").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }
}
