//! Versioned runtime configuration.
//!
//! Sections that may be swapped while processors are running (SIGHUP
//! reload) are held in a `ConfigStore<T>`. Readers take a cheap snapshot
//! per unit of work, so a reload never changes values halfway through one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Shared, versioned configuration section.
pub struct ConfigStore<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    data: RwLock<T>,
    version: AtomicU64,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(initial),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the stored value and bump the version.
    pub async fn update(&self, value: T) {
        let mut guard = self.inner.data.write().await;
        *guard = value;
        self.inner.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of updates applied since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Clone the current value.
    pub async fn snapshot(&self) -> T {
        self.inner.data.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
