// blobcmd - Blob Storage from the Command Line
// Copyright (C) 2025 blobcmd Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Service handle cache
//!
//! [`ClientCache`] maps a [`ConnectionDescriptor`] to a shared
//! `Arc<dyn BlobService>`. Each descriptor owns a `tokio::sync::OnceCell`, so
//! concurrent first requests for one account wait on a single construction
//! while requests for other accounts proceed. The map lock is only held to
//! find or insert the cell. A failed construction leaves the cell empty and
//! the next resolve tries again.
//!
//! ```
//! use blobcmd_storage::{ClientCache, ConnectionDescriptor, memory::MemoryConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = Arc::new(MemoryConnector::new());
//!     let cache = ClientCache::new(connector.clone());
//!     let descriptor = ConnectionDescriptor {
//!         account_name: "acct".into(),
//!         account_key: "a2V5".into(),
//!         service: "blob".into(),
//!         endpoint: "core.windows.net".into(),
//!         use_https: true,
//!     };
//!
//!     let first = cache.resolve(&descriptor).await.unwrap();
//!     let second = cache.resolve(&descriptor).await.unwrap();
//!     assert!(Arc::ptr_eq(&first, &second));
//!     assert_eq!(connector.constructions(), 1);
//! }
//! ```

use crate::address::ConnectionDescriptor;
use crate::error::{StorageError, StorageResult};
use crate::BlobService;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Builds service handles for the cache
#[async_trait]
pub trait ServiceConnector: Send + Sync + Debug {
    /// Construct a handle for one account
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> anyhow::Result<Arc<dyn BlobService>>;
}

type Slot = Arc<OnceCell<Arc<dyn BlobService>>>;

/// Cache of service handles keyed by connection descriptor
pub struct ClientCache {
    connector: Arc<dyn ServiceConnector>,
    slots: Mutex<HashMap<ConnectionDescriptor, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    constructions: AtomicU64,
    failures: AtomicU64,
}

impl ClientCache {
    /// Create an empty cache building handles with `connector`
    pub fn new(connector: Arc<dyn ServiceConnector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            constructions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Handle for `descriptor`, constructed on first use
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] when the descriptor is incomplete
    /// or the connector fails. Failures are not remembered.
    pub async fn resolve(&self, descriptor: &ConnectionDescriptor) -> StorageResult<Arc<dyn BlobService>> {
        let missing = descriptor.missing_fields();
        if !missing.is_empty() {
            return Err(connection_error(
                descriptor,
                anyhow!("missing {}", missing.join(", ")),
            ));
        }

        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(descriptor.clone()).or_default())
        };

        if let Some(handle) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(handle));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let built = slot
            .get_or_try_init(|| async {
                debug!(account = %descriptor.account_name, endpoint = %descriptor.endpoint, "Connecting");
                match self.connector.connect(descriptor).await {
                    Ok(handle) => {
                        self.constructions.fetch_add(1, Ordering::Relaxed);
                        Ok(handle)
                    }
                    Err(e) => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(account = %descriptor.account_name, error = %e, "Connection failed");
                        Err(connection_error(descriptor, e))
                    }
                }
            })
            .await
            .map(Arc::clone);
        match built {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.discard_empty(descriptor, slot).await;
                Err(e)
            }
        }
    }

    /// Remove an uninitialized slot once no other resolve still holds it
    async fn discard_empty(&self, descriptor: &ConnectionDescriptor, slot: Slot) {
        let ptr = Arc::as_ptr(&slot) as usize;
        drop(slot);
        let mut slots = self.slots.lock().await;
        let abandoned = slots.get(descriptor).is_some_and(|current| {
            Arc::as_ptr(current) as usize == ptr && Arc::strong_count(current) == 1 && !current.initialized()
        });
        if abandoned {
            slots.remove(descriptor);
        }
    }

    /// Drop the handle for `descriptor`; true if one was cached
    pub async fn evict(&self, descriptor: &ConnectionDescriptor) -> bool {
        let removed = self.slots.lock().await.remove(descriptor);
        removed.is_some_and(|slot| slot.initialized())
    }

    /// Drop every cached handle
    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    /// Number of live handles
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// True when no handle is cached
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entry_count: self.len().await,
            hits,
            misses,
            constructions: self.constructions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}

impl Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("connector", &self.connector)
            .field("constructions", &self.constructions.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn connection_error(descriptor: &ConnectionDescriptor, source: anyhow::Error) -> StorageError {
    StorageError::Connection {
        account: descriptor.account_name.clone(),
        endpoint: descriptor.endpoint.clone(),
        source,
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Live handles
    pub entry_count: usize,
    /// Resolves answered by an existing handle
    pub hits: u64,
    /// Resolves that had to wait for or perform a construction
    pub misses: u64,
    /// Successful constructions
    pub constructions: u64,
    /// Failed constructions
    pub failures: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;

    fn descriptor(account: &str) -> ConnectionDescriptor {
        ConnectionDescriptor {
            account_name: account.to_string(),
            account_key: "a2V5".to_string(),
            service: "blob".to_string(),
            endpoint: "core.windows.net".to_string(),
            use_https: true,
        }
    }

    #[tokio::test]
    async fn test_hit_after_first_resolve() {
        let cache = ClientCache::new(Arc::new(MemoryConnector::new()));
        cache.resolve(&descriptor("a")).await.unwrap();
        cache.resolve(&descriptor("a")).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.constructions, 1);
        assert!(stats.hit_rate > 0.49 && stats.hit_rate < 0.51);
    }

    #[tokio::test]
    async fn test_descriptors_differing_in_transport_are_distinct() {
        let connector = Arc::new(MemoryConnector::new());
        let cache = ClientCache::new(connector.clone());
        let secure = descriptor("a");
        let plain = ConnectionDescriptor {
            use_https: false,
            ..secure.clone()
        };
        cache.resolve(&secure).await.unwrap();
        cache.resolve(&plain).await.unwrap();
        assert_eq!(connector.constructions(), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_incomplete_descriptor_never_reaches_connector() {
        let connector = Arc::new(MemoryConnector::new());
        let cache = ClientCache::new(connector.clone());
        let mut bad = descriptor("a");
        bad.account_key.clear();

        let err = cache.resolve(&bad).await.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("account key"));
        assert_eq!(connector.constructions(), 0);
    }

    #[tokio::test]
    async fn test_failed_constructions_leave_no_slots() {
        let connector = Arc::new(MemoryConnector::new());
        let cache = ClientCache::new(connector.clone());
        connector.fail_next(50);

        for i in 0..50 {
            assert!(cache.resolve(&descriptor(&format!("bad{}", i))).await.is_err());
        }
        assert!(cache.slots.lock().await.is_empty());
        assert_eq!(cache.stats().await.failures, 50);

        cache.resolve(&descriptor("good")).await.unwrap();
        assert_eq!(cache.slots.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_forces_reconstruction() {
        let connector = Arc::new(MemoryConnector::new());
        let cache = ClientCache::new(connector.clone());
        cache.resolve(&descriptor("a")).await.unwrap();
        assert!(cache.evict(&descriptor("a")).await);
        assert!(cache.is_empty().await);
        cache.resolve(&descriptor("a")).await.unwrap();
        assert_eq!(connector.constructions(), 2);
    }
}
