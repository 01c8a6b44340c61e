//! Status Store Adapters
//!
//! Job status, progress, and metadata live in three hashes of a key/value
//! store, each keyed by job id. The store only needs hash-field get and set.
//!
//! ```text
//! hustler.status   { <job id> => "queued" | "completed" | "failed" }
//! hustler.progress { <job id> => "0.5" }
//! hustler.data     { <job id> => "{\"key\":\"value\"}" }
//! ```
//!
//! Entries never expire.

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::RedisStatusStore;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::io::Result as IoResult;
use std::pin::Pin;
use std::sync::Arc;

/// Default namespace for the three status hashes
pub const DEFAULT_NAMESPACE: &str = "hustler";

/// Hash-field key/value store
pub trait StatusStore: Send + Sync + 'static {
    /// Read one field of a hash; `None` when the hash or field is absent
    fn hget<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Option<String>>> + Send + 'a>>;

    /// Write one field of a hash
    fn hset<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;
}

/// Names of the three per-job hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusKeys {
    pub status: String,
    pub progress: String,
    pub data: String,
}

impl StatusKeys {
    pub fn new(namespace: &str) -> Self {
        StatusKeys {
            status: format!("{}.status", namespace),
            progress: format!("{}.progress", namespace),
            data: format!("{}.data", namespace),
        }
    }
}

impl Default for StatusKeys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

// ============================================================================
// InMemoryStatusStore - For tests and DST
// ============================================================================

/// In-memory status store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatusStore {
    hashes: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields in a hash (for testing)
    pub fn hlen(&self, hash: &str) -> usize {
        self.hashes.read().get(hash).map_or(0, |h| h.len())
    }

    /// All fields of a hash (for testing)
    pub fn hgetall(&self, hash: &str) -> HashMap<String, String> {
        self.hashes.read().get(hash).cloned().unwrap_or_default()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn hget<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .hashes
                .read()
                .get(hash)
                .and_then(|h| h.get(field))
                .cloned())
        })
    }

    fn hset<'a>(
        &'a self,
        hash: &'a str,
        field: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.hashes
                .write()
                .entry(hash.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
            Ok(())
        })
    }
}
