//! Simulated Object Store with Fault Injection
//!
//! DST-compatible wrapper that injects seeded faults into another store.
//! Same seed, same sequence of operations, same faults.

use crate::store::{ListResult, ObjectMeta, ObjectStore, PutOptions, UrlOptions};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
    /// Probability of DELETE failure
    pub delete_fail_prob: f64,
    /// Probability of LIST failure
    pub list_fail_prob: f64,
    /// Probability of LIST silently omitting trailing objects (stale listing)
    pub list_incomplete_prob: f64,
    /// Probability of RENAME failure
    pub rename_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01,        // 1%
            get_fail_prob: 0.01,        // 1%
            delete_fail_prob: 0.01,     // 1%
            list_fail_prob: 0.01,       // 1%
            list_incomplete_prob: 0.02, // 2%
            rename_fail_prob: 0.01,     // 1%
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.05,
            get_fail_prob: 0.05,
            delete_fail_prob: 0.05,
            list_fail_prob: 0.05,
            list_incomplete_prob: 0.10,
            rename_fail_prob: 0.05,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
            delete_fail_prob: 0.0,
            list_fail_prob: 0.0,
            list_incomplete_prob: 0.0,
            rename_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub delete_attempts: u64,
    pub delete_failures: u64,
    pub list_attempts: u64,
    pub list_failures: u64,
    pub list_incomplete: u64,
    pub rename_attempts: u64,
    pub rename_failures: u64,
}

impl SimulatedStoreStats {
    pub fn total_faults(&self) -> u64 {
        self.put_failures
            + self.get_failures
            + self.delete_failures
            + self.list_failures
            + self.list_incomplete
            + self.rename_failures
    }
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
}

/// Simulated object store that wraps another store and injects faults
pub struct SimulatedObjectStore<S: ObjectStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

impl<S: ObjectStore> SimulatedObjectStore<S> {
    /// Create a new simulated store seeded with `seed`
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Count an attempt and roll for a fault; counts the fault if it fires
    fn roll(
        &self,
        prob: f64,
        attempt: fn(&mut SimulatedStoreStats),
        fault: fn(&mut SimulatedStoreStats),
    ) -> bool {
        let mut s = self.state.lock();
        attempt(&mut s.stats);
        let fired = prob > 0.0 && s.rng.gen_bool(prob.min(1.0));
        if fired {
            fault(&mut s.stats);
        }
        fired
    }
}

impl<S: ObjectStore + Clone> Clone for SimulatedObjectStore<S> {
    fn clone(&self) -> Self {
        SimulatedObjectStore {
            inner_store: self.inner_store.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: ObjectStore> ObjectStore for SimulatedObjectStore<S> {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.roll(
                self.config.put_fail_prob,
                |s| s.put_attempts += 1,
                |s| s.put_failures += 1,
            ) {
                return Err(IoError::new(ErrorKind::Other, "simulated put failure"));
            }
            self.inner_store.put(key, data, options).await
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            if self.roll(
                self.config.get_fail_prob,
                |s| s.get_attempts += 1,
                |s| s.get_failures += 1,
            ) {
                return Err(IoError::new(ErrorKind::Other, "simulated get failure"));
            }
            self.inner_store.get(key).await
        })
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>> {
        self.inner_store.exists(key)
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.roll(
                self.config.delete_fail_prob,
                |s| s.delete_attempts += 1,
                |s| s.delete_failures += 1,
            ) {
                return Err(IoError::new(ErrorKind::Other, "simulated delete failure"));
            }
            self.inner_store.delete(key).await
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            if self.roll(
                self.config.list_fail_prob,
                |s| s.list_attempts += 1,
                |s| s.list_failures += 1,
            ) {
                return Err(IoError::new(ErrorKind::Other, "simulated list failure"));
            }

            let mut result = self.inner_store.list(prefix, continuation_token).await?;

            // Stale listing: drop a random-length tail of this page
            let truncate_at = {
                let mut s = self.state.lock();
                if result.objects.len() > 1
                    && self.config.list_incomplete_prob > 0.0
                    && s.rng.gen_bool(self.config.list_incomplete_prob.min(1.0))
                {
                    s.stats.list_incomplete += 1;
                    Some(s.rng.gen_range(1..result.objects.len()))
                } else {
                    None
                }
            };
            if let Some(len) = truncate_at {
                result.objects.truncate(len);
            }

            Ok(result)
        })
    }

    fn rename<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.roll(
                self.config.rename_fail_prob,
                |s| s.rename_attempts += 1,
                |s| s.rename_failures += 1,
            ) {
                return Err(IoError::new(ErrorKind::Other, "simulated rename failure"));
            }
            self.inner_store.rename(from, to).await
        })
    }

    fn head<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        self.inner_store.head(key)
    }

    fn url_for<'a>(
        &'a self,
        key: &'a str,
        options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>> {
        self.inner_store.url_for(key, options)
    }
}
