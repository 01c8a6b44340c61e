//! Pipeline wiring
//!
//! A [`Pipeline`] holds everything a job needs: the queue and processed
//! buckets, the status store, the claim strategy, the active processor, and
//! the settings that govern writes. Nothing here is global; tests build a
//! pipeline from in-memory stores, the binary builds one from
//! [`HustlerConfig`].

use crate::claim::{is_claimed, ClaimStrategy, RenameClaim};
use crate::config::{ConfigError, HustlerConfig, ObjectStoreType, StatusBackend};
use crate::content::{content_hash, is_content_hash};
use crate::job::Job;
use crate::processor::{PassthroughProcessor, Processor, ProcessorRegistry};
use crate::status::{InMemoryStatusStore, StatusKeys, StatusStore};
use crate::store::{
    list_all, AccessPolicy, InMemoryObjectStore, LocalFsObjectStore, ObjectMeta, ObjectStore,
    PutOptions, UrlOptions,
};
use serde::{Deserialize, Serialize};
use std::io::{Error as IoError, Result as IoResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What to do when an output's content-hash key is already taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the stored object; identical hash means identical bytes
    #[default]
    Skip,
    /// Write again
    Overwrite,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ConflictPolicy::Skip),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            other => Err(format!("unknown conflict policy '{}'", other)),
        }
    }
}

/// Settings governing listing and writes
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Display name of the queue location
    pub queue_name: String,
    /// Key prefix polled in the queue store
    pub queue_prefix: String,
    /// Key prefix for outputs in the processed store
    pub processed_prefix: String,
    pub access_policy: AccessPolicy,
    pub conflict_policy: ConflictPolicy,
    /// Validity of generated URLs for private objects
    pub expire_urls_in: Option<Duration>,
    pub status_keys: StatusKeys,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            queue_name: "queue".to_string(),
            queue_prefix: String::new(),
            processed_prefix: String::new(),
            access_policy: AccessPolicy::default(),
            conflict_policy: ConflictPolicy::default(),
            expire_urls_in: None,
            status_keys: StatusKeys::default(),
        }
    }
}

/// One listing of the queue
#[derive(Debug, Clone, Default)]
pub struct QueueScan {
    /// Keys returned, claimed or not
    pub listed: usize,
    /// Unclaimed items in listing order
    pub available: Vec<ObjectMeta>,
}

impl QueueScan {
    /// Keys skipped because they already carry the claim sentinel
    pub fn claimed(&self) -> usize {
        self.listed - self.available.len()
    }
}

/// Error type for building or driving a pipeline
#[derive(Debug)]
pub enum PipelineError {
    /// Store I/O error
    Io(IoError),
    /// Configuration rejected
    Config(ConfigError),
    /// Backend selected in configuration is not compiled in
    BackendUnavailable(&'static str),
    /// Not a 40-character lowercase hex content hash
    InvalidHash(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
            PipelineError::Config(e) => write!(f, "configuration error: {}", e),
            PipelineError::BackendUnavailable(feature) => {
                write!(f, "backend requires the '{}' feature", feature)
            }
            PipelineError::InvalidHash(hash) => write!(f, "'{}' is not a content hash", hash),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io(e) => Some(e),
            PipelineError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for PipelineError {
    fn from(e: IoError) -> Self {
        PipelineError::Io(e)
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Config(e)
    }
}

/// Stores, strategy, and settings shared by every job
pub struct Pipeline {
    queue: Arc<dyn ObjectStore>,
    processed: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    claim: Arc<dyn ClaimStrategy>,
    processor: Arc<dyn Processor>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Build a pipeline from configuration, connecting to the configured
    /// backends.
    pub async fn from_config(
        config: &HustlerConfig,
        registry: &ProcessorRegistry,
    ) -> Result<Arc<Pipeline>, PipelineError> {
        config.validate()?;
        config.validate_processor(registry)?;

        let processor = registry.resolve(&config.processor).ok_or_else(|| {
            ConfigError::UnknownProcessor {
                name: config.processor.clone(),
                known: Vec::new(),
            }
        })?;

        let queue = build_object_store(config, &config.queue_bucket_name)?;
        let processed = build_object_store(config, &config.processed_bucket_name)?;
        let status = build_status_store(config).await?;

        info!(
            queue = %config.queue_bucket_name,
            processed = %config.processed_bucket_name,
            store = ?config.store_type,
            status = ?config.status_backend,
            processor = %config.processor,
            "pipeline ready"
        );

        Ok(PipelineBuilder::new(queue, processed, status)
            .processor(processor)
            .settings(config.pipeline_settings())
            .build())
    }

    pub fn queue(&self) -> &Arc<dyn ObjectStore> {
        &self.queue
    }

    pub fn processed(&self) -> &Arc<dyn ObjectStore> {
        &self.processed
    }

    pub fn status(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    pub fn claim_strategy(&self) -> &Arc<dyn ClaimStrategy> {
        &self.claim
    }

    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Processed-store key for an output hash
    pub fn processed_key(&self, hash: &str) -> String {
        format!("{}{}", self.settings.processed_prefix, hash)
    }

    /// Deposit content in the queue under its content hash; returns the key
    pub async fn enqueue(&self, content: &[u8]) -> Result<String, PipelineError> {
        let key = format!("{}{}", self.settings.queue_prefix, content_hash(content));
        self.queue
            .put(&key, content, PutOptions::with_access(self.settings.access_policy))
            .await?;
        debug!(%key, bytes = content.len(), "enqueued");
        Ok(key)
    }

    /// List every page of the queue and split off claimed keys
    pub async fn scan(&self) -> IoResult<QueueScan> {
        let mut items = list_all(self.queue.as_ref(), &self.settings.queue_prefix).await?;
        let listed = items.len();
        items.retain(|item| !is_claimed(&item.key));
        Ok(QueueScan {
            listed,
            available: items,
        })
    }

    /// Unclaimed queue items in listing order
    pub async fn available(&self) -> Result<Vec<ObjectMeta>, PipelineError> {
        Ok(self.scan().await?.available)
    }

    /// URL of a processed output. Expiry applies only to private content.
    pub async fn url_for(&self, hash: &str) -> Result<String, PipelineError> {
        if !is_content_hash(hash) {
            return Err(PipelineError::InvalidHash(hash.to_string()));
        }
        let options = UrlOptions {
            expires_in: if self.settings.access_policy.is_public() {
                None
            } else {
                self.settings.expire_urls_in
            },
        };
        Ok(self
            .processed
            .url_for(&self.processed_key(hash), options)
            .await?)
    }

    /// Look up an existing job by id
    pub fn find_job(self: &Arc<Self>, id: impl Into<String>) -> Job {
        Job::find(self.clone(), id)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Pipeline`] from injected parts
pub struct PipelineBuilder {
    queue: Arc<dyn ObjectStore>,
    processed: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    claim: Arc<dyn ClaimStrategy>,
    processor: Arc<dyn Processor>,
    settings: PipelineSettings,
}

impl PipelineBuilder {
    /// Start with rename claims, the passthrough processor, and default
    /// settings
    pub fn new(
        queue: Arc<dyn ObjectStore>,
        processed: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
    ) -> Self {
        PipelineBuilder {
            queue,
            processed,
            status,
            claim: Arc::new(RenameClaim),
            processor: Arc::new(PassthroughProcessor),
            settings: PipelineSettings::default(),
        }
    }

    pub fn claim_strategy(mut self, claim: Arc<dyn ClaimStrategy>) -> Self {
        self.claim = claim;
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn access_policy(mut self, access_policy: AccessPolicy) -> Self {
        self.settings.access_policy = access_policy;
        self
    }

    pub fn conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.settings.conflict_policy = conflict_policy;
        self
    }

    pub fn expire_urls_in(mut self, expire_urls_in: Option<Duration>) -> Self {
        self.settings.expire_urls_in = expire_urls_in;
        self
    }

    pub fn queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.queue_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Arc<Pipeline> {
        Arc::new(Pipeline {
            queue: self.queue,
            processed: self.processed,
            status: self.status,
            claim: self.claim,
            processor: self.processor,
            settings: self.settings,
        })
    }
}

/// Object store for one bucket, per the configured backend
fn build_object_store(
    config: &HustlerConfig,
    bucket: &str,
) -> Result<Arc<dyn ObjectStore>, PipelineError> {
    match config.store_type {
        ObjectStoreType::InMemory => Ok(Arc::new(InMemoryObjectStore::named(bucket))),
        ObjectStoreType::LocalFs => {
            let base = config
                .local_path
                .as_ref()
                .ok_or(ConfigError::MissingLocalPath)?;
            Ok(Arc::new(LocalFsObjectStore::new(base.join(bucket))))
        }
        #[cfg(feature = "s3")]
        ObjectStoreType::S3 => {
            let store = crate::store::S3ObjectStore::new(crate::store::S3Config {
                bucket: bucket.to_string(),
                region: config.region.clone(),
                endpoint: config.s3_endpoint.clone(),
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                access_policy: config.access_policy,
            })?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        ObjectStoreType::S3 => Err(PipelineError::BackendUnavailable("s3")),
    }
}

async fn build_status_store(config: &HustlerConfig) -> Result<Arc<dyn StatusStore>, PipelineError> {
    match config.status_backend {
        StatusBackend::InMemory => Ok(Arc::new(InMemoryStatusStore::new())),
        #[cfg(feature = "redis")]
        StatusBackend::Redis => {
            let store =
                crate::status::RedisStatusStore::connect(&config.redis_host, config.redis_port)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StatusBackend::Redis => Err(PipelineError::BackendUnavailable("redis")),
    }
}
