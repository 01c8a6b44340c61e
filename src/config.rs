//! Hustler configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables:
//!
//! ## Locations
//! - `HUSTLER_CONFIG`: Path to a TOML config file (optional)
//! - `HUSTLER_QUEUE_BUCKET`: Bucket polled for incoming items
//! - `HUSTLER_PROCESSED_BUCKET`: Bucket outputs are written to
//! - `HUSTLER_STORE_TYPE`: `memory`, `localfs`, or `s3` (default: memory)
//! - `HUSTLER_DATA_PATH`: Base directory for `localfs` (one subdirectory per bucket)
//!
//! ## S3
//! - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`
//! - `HUSTLER_S3_ENDPOINT`: Custom endpoint for S3-compatible services
//!
//! ## Status store
//! - `HUSTLER_STATUS_BACKEND`: `memory` or `redis` (default: redis)
//! - `REDIS_HOST` (default: localhost), `REDIS_PORT` (default: 6379)
//!
//! ## Behavior
//! - `HUSTLER_ACCESS_POLICY`: `private` or `public-read` (default: private)
//! - `HUSTLER_EXPIRE_URLS_IN`: URL validity in seconds for private content
//! - `HUSTLER_CONFLICT_POLICY`: `skip` or `overwrite` (default: skip)
//! - `HUSTLER_PROCESSOR`: Registered processor name (default: passthrough)
//! - `HUSTLER_POLL_INTERVAL_MS`: Sleep between worker cycles (default: 1000)

use crate::pipeline::{ConflictPolicy, PipelineSettings};
use crate::processor::{ProcessorRegistry, DEFAULT_PROCESSOR};
use crate::status::{StatusKeys, DEFAULT_NAMESPACE};
use crate::store::AccessPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Object store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreType {
    /// In-memory storage (testing only)
    #[default]
    #[serde(rename = "memory")]
    InMemory,
    /// Local filesystem (development)
    LocalFs,
    /// Amazon S3 or compatible
    S3,
}

impl std::str::FromStr for ObjectStoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(ObjectStoreType::InMemory),
            "localfs" => Ok(ObjectStoreType::LocalFs),
            "s3" => Ok(ObjectStoreType::S3),
            other => Err(format!("unknown store type '{}'", other)),
        }
    }
}

/// Status store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBackend {
    #[serde(rename = "memory")]
    InMemory,
    #[default]
    Redis,
}

impl std::str::FromStr for StatusBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StatusBackend::InMemory),
            "redis" => Ok(StatusBackend::Redis),
            other => Err(format!("unknown status backend '{}'", other)),
        }
    }
}

/// Error type for loading or validating configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// Config file is not valid TOML for this struct
    Parse(toml::de::Error),
    /// An environment variable holds an unusable value
    InvalidEnv { var: &'static str, message: String },
    EmptyBucketName(&'static str),
    /// Queue and processed buckets would be the same location
    SameBucket(String),
    MissingLocalPath,
    UnknownProcessor { name: String, known: Vec<String> },
    /// The queue lives only inside this process, so an upload would vanish
    EphemeralQueue,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "invalid config file: {}", e),
            ConfigError::InvalidEnv { var, message } => write!(f, "{}: {}", var, message),
            ConfigError::EmptyBucketName(which) => write!(f, "{} bucket name is empty", which),
            ConfigError::SameBucket(name) => {
                write!(f, "queue and processed bucket are both '{}'", name)
            }
            ConfigError::MissingLocalPath => {
                write!(f, "localfs store requires a data path (HUSTLER_DATA_PATH)")
            }
            ConfigError::UnknownProcessor { name, known } => write!(
                f,
                "unknown processor '{}' (registered: {})",
                name,
                known.join(", ")
            ),
            ConfigError::EphemeralQueue => write!(
                f,
                "memory store is private to this process; set HUSTLER_STORE_TYPE to localfs or s3"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Everything needed to build a pipeline and a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HustlerConfig {
    pub queue_bucket_name: String,
    pub processed_bucket_name: String,
    pub store_type: ObjectStoreType,
    /// Base directory for the `localfs` store
    pub local_path: Option<PathBuf>,

    pub region: String,
    pub s3_endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    pub status_backend: StatusBackend,
    pub redis_host: String,
    pub redis_port: u16,
    /// Prefix of the status, progress, and data hashes
    pub namespace: String,

    pub access_policy: AccessPolicy,
    /// Validity of URLs for private content; `None` means no expiry
    #[serde(with = "duration_secs")]
    pub expire_urls_in: Option<Duration>,
    pub conflict_policy: ConflictPolicy,
    pub processor: String,
    pub poll_interval_ms: u64,
}

impl Default for HustlerConfig {
    fn default() -> Self {
        HustlerConfig {
            queue_bucket_name: "queue.hustler.development".to_string(),
            processed_bucket_name: "processed.hustler.development".to_string(),
            store_type: ObjectStoreType::default(),
            local_path: None,
            region: "us-east-1".to_string(),
            s3_endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            status_backend: StatusBackend::default(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            namespace: DEFAULT_NAMESPACE.to_string(),
            access_policy: AccessPolicy::default(),
            expire_urls_in: None,
            conflict_policy: ConflictPolicy::default(),
            processor: DEFAULT_PROCESSOR.to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl HustlerConfig {
    /// Fully in-memory configuration for tests
    pub fn test() -> Self {
        HustlerConfig {
            queue_bucket_name: "queue.hustler.test".to_string(),
            processed_bucket_name: "processed.hustler.test".to_string(),
            store_type: ObjectStoreType::InMemory,
            status_backend: StatusBackend::InMemory,
            poll_interval_ms: 10,
            ..Default::default()
        }
    }

    /// Load from `HUSTLER_CONFIG` (if set) and the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("HUSTLER_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Override fields from environment variables that are set
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HUSTLER_QUEUE_BUCKET") {
            self.queue_bucket_name = v;
        }
        if let Some(v) = lookup("HUSTLER_PROCESSED_BUCKET") {
            self.processed_bucket_name = v;
        }
        if let Some(v) = lookup("HUSTLER_STORE_TYPE") {
            self.store_type = parse_env("HUSTLER_STORE_TYPE", &v)?;
        }
        if let Some(v) = lookup("HUSTLER_DATA_PATH") {
            self.local_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.region = v;
        }
        if let Some(v) = lookup("HUSTLER_S3_ENDPOINT") {
            self.s3_endpoint = Some(v);
        }
        if let Some(v) = lookup("AWS_ACCESS_KEY_ID") {
            self.access_key_id = Some(v);
        }
        if let Some(v) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.secret_access_key = Some(v);
        }
        if let Some(v) = lookup("HUSTLER_STATUS_BACKEND") {
            self.status_backend = parse_env("HUSTLER_STATUS_BACKEND", &v)?;
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.redis_host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.redis_port = parse_env("REDIS_PORT", &v)?;
        }
        if let Some(v) = lookup("HUSTLER_ACCESS_POLICY") {
            self.access_policy = parse_env("HUSTLER_ACCESS_POLICY", &v)?;
        }
        if let Some(v) = lookup("HUSTLER_EXPIRE_URLS_IN") {
            let secs: u64 = parse_env("HUSTLER_EXPIRE_URLS_IN", &v)?;
            self.expire_urls_in = Some(Duration::from_secs(secs));
        }
        if let Some(v) = lookup("HUSTLER_CONFLICT_POLICY") {
            self.conflict_policy = parse_env("HUSTLER_CONFLICT_POLICY", &v)?;
        }
        if let Some(v) = lookup("HUSTLER_PROCESSOR") {
            self.processor = v;
        }
        if let Some(v) = lookup("HUSTLER_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env("HUSTLER_POLL_INTERVAL_MS", &v)?;
        }
        Ok(())
    }

    /// Structural checks that need no registry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_bucket_name.trim().is_empty() {
            return Err(ConfigError::EmptyBucketName("queue"));
        }
        if self.processed_bucket_name.trim().is_empty() {
            return Err(ConfigError::EmptyBucketName("processed"));
        }
        if self.queue_bucket_name == self.processed_bucket_name {
            return Err(ConfigError::SameBucket(self.queue_bucket_name.clone()));
        }
        if self.store_type == ObjectStoreType::LocalFs && self.local_path.is_none() {
            return Err(ConfigError::MissingLocalPath);
        }
        Ok(())
    }

    /// True when no other process can see the queue
    pub fn queue_is_ephemeral(&self) -> bool {
        self.store_type == ObjectStoreType::InMemory
    }

    /// Checks for a producer, which must write somewhere a worker can read
    pub fn validate_producer(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.queue_is_ephemeral() {
            return Err(ConfigError::EphemeralQueue);
        }
        Ok(())
    }

    /// Check the configured processor is registered
    pub fn validate_processor(&self, registry: &ProcessorRegistry) -> Result<(), ConfigError> {
        if registry.contains(&self.processor) {
            return Ok(());
        }
        Err(ConfigError::UnknownProcessor {
            name: self.processor.clone(),
            known: registry.names().into_iter().map(String::from).collect(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settings handed to the pipeline
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            queue_name: self.queue_bucket_name.clone(),
            access_policy: self.access_policy,
            conflict_policy: self.conflict_policy,
            expire_urls_in: self.expire_urls_in,
            status_keys: StatusKeys::new(&self.namespace),
            ..Default::default()
        }
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var,
        message: e.to_string(),
    })
}

/// `Option<Duration>` as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
