//! Pluggable transformations
//!
//! A [`Processor`] turns the content of one queue item into zero, one, or
//! many outputs. Expected failures are reported through the return value
//! ([`ProcessorOutput::Empty`]); `Err` is reserved for faults.
//!
//! While running, a processor talks to its job through a
//! [`ProcessorContext`]: progress and metadata writes go straight to the
//! status store.

use crate::job::{Job, JobError};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Name of the processor used when none is configured
pub const DEFAULT_PROCESSOR: &str = "passthrough";

/// What a processor hands back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOutput {
    /// Nothing usable; the job fails
    Empty,
    /// One output object
    Single(Bytes),
    /// Several output objects, written independently
    Many(Vec<Bytes>),
}

impl ProcessorOutput {
    /// Output streams to store, or `None` when the run counts as a failure
    pub fn into_streams(self) -> Option<Vec<Bytes>> {
        match self {
            ProcessorOutput::Empty => None,
            ProcessorOutput::Single(stream) => Some(vec![stream]),
            ProcessorOutput::Many(streams) if streams.is_empty() => None,
            ProcessorOutput::Many(streams) => Some(streams),
        }
    }
}

impl From<Bytes> for ProcessorOutput {
    fn from(stream: Bytes) -> Self {
        ProcessorOutput::Single(stream)
    }
}

impl From<Vec<Bytes>> for ProcessorOutput {
    fn from(streams: Vec<Bytes>) -> Self {
        ProcessorOutput::Many(streams)
    }
}

impl From<Option<Bytes>> for ProcessorOutput {
    fn from(stream: Option<Bytes>) -> Self {
        stream.map_or(ProcessorOutput::Empty, ProcessorOutput::Single)
    }
}

/// Unexpected fault inside a processor
#[derive(Debug)]
pub enum ProcessorError {
    /// Reading or writing job state failed
    Job(Box<JobError>),
    /// Anything else the processor wants to surface
    Other(String),
    /// The processor panicked; holds the panic message when it had one
    Panicked(String),
}

impl ProcessorError {
    pub fn other(msg: impl Into<String>) -> Self {
        ProcessorError::Other(msg.into())
    }

    /// Build from a caught panic payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = match payload.downcast::<String>() {
            Ok(msg) => *msg,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        ProcessorError::Panicked(msg)
    }
}

impl std::fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorError::Job(e) => write!(f, "job state error: {}", e),
            ProcessorError::Other(msg) => write!(f, "processor fault: {}", msg),
            ProcessorError::Panicked(msg) => write!(f, "processor panicked: {}", msg),
        }
    }
}

impl std::error::Error for ProcessorError {}

impl From<JobError> for ProcessorError {
    fn from(e: JobError) -> Self {
        ProcessorError::Job(Box::new(e))
    }
}

/// The processor's view of the job it is running for
#[derive(Clone, Copy)]
pub struct ProcessorContext<'a> {
    job: &'a Job,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(job: &'a Job) -> Self {
        ProcessorContext { job }
    }

    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    /// Report progress in [0.0, 1.0]
    pub async fn progress(&self, value: f64) -> Result<(), ProcessorError> {
        Ok(self.job.set_progress(value).await?)
    }

    /// Merge one metadata entry into the job's data
    pub async fn set(&self, key: &str, value: impl Into<JsonValue>) -> Result<(), ProcessorError> {
        Ok(self.job.set_data(key, value.into()).await?)
    }

    /// Read one metadata entry
    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>, ProcessorError> {
        Ok(self.job.data().await?.remove(key))
    }
}

/// Transformation strategy run for every claimed item
pub trait Processor: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        ctx: ProcessorContext<'a>,
        content: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>>;

    /// Called after the job reached `completed`
    fn on_complete(&self, _job: &Job) {}

    /// Called after the job reached `failed`
    fn on_error(&self, _job: &Job) {}
}

/// Returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

impl Processor for PassthroughProcessor {
    fn run<'a>(
        &'a self,
        _ctx: ProcessorContext<'a>,
        content: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>> {
        Box::pin(async move { Ok(ProcessorOutput::Single(content)) })
    }
}

/// Processors selectable by name from configuration
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        ProcessorRegistry {
            processors: HashMap::new(),
        }
    }

    /// Registry holding the built-in processors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_PROCESSOR, Arc::new(PassthroughProcessor));
        registry
    }

    /// Add or replace a processor
    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) -> &mut Self {
        self.processors.insert(name.into(), processor);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_streams() {
        assert_eq!(ProcessorOutput::Empty.into_streams(), None);
        assert_eq!(ProcessorOutput::Many(vec![]).into_streams(), None);
        assert_eq!(
            ProcessorOutput::Single(Bytes::from_static(b"a")).into_streams(),
            Some(vec![Bytes::from_static(b"a")])
        );
        assert_eq!(
            ProcessorOutput::Many(vec![Bytes::from_static(b"FOO"), Bytes::from_static(b"BAR")])
                .into_streams()
                .map(|s| s.len()),
            Some(2)
        );
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(ProcessorOutput::from(None), ProcessorOutput::Empty);
        assert_eq!(
            ProcessorOutput::from(Some(Bytes::from_static(b"x"))),
            ProcessorOutput::Single(Bytes::from_static(b"x"))
        );
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ProcessorRegistry::with_defaults();
        assert!(registry.contains(DEFAULT_PROCESSOR));
        assert!(registry.resolve("thumbnail").is_none());
        assert_eq!(registry.names(), vec!["passthrough"]);
    }

    #[test]
    fn test_registry_register_custom() {
        let mut registry = ProcessorRegistry::with_defaults();
        registry.register("copy", Arc::new(PassthroughProcessor));
        assert_eq!(registry.names(), vec!["copy", "passthrough"]);
        assert!(registry.resolve("copy").is_some());
    }
}
