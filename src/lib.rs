//! Content-addressed job processing over an object store queue.
//!
//! Producers drop items into a queue bucket. A [`Worker`] polls the bucket,
//! claims each item by renaming it, runs the configured [`Processor`], and
//! stores every output in the processed bucket under the SHA-1 of its bytes.
//! Job status, progress, and metadata live in a [`StatusStore`] keyed by the
//! SHA-1 of the item's content.

pub mod claim;
pub mod config;
pub mod content;
pub mod dst;
pub mod job;
pub mod observability;
pub mod pipeline;
pub mod processor;
pub mod status;
pub mod store;
pub mod worker;

pub use claim::{ClaimOutcome, ClaimStrategy, RenameClaim};
pub use config::{ConfigError, HustlerConfig};
pub use content::content_hash;
pub use job::{Job, JobData, JobError, JobStatus};
pub use pipeline::{
    ConflictPolicy, Pipeline, PipelineBuilder, PipelineError, PipelineSettings, QueueScan,
};
pub use processor::{
    PassthroughProcessor, Processor, ProcessorContext, ProcessorError, ProcessorOutput,
    ProcessorRegistry,
};
pub use status::{InMemoryStatusStore, StatusKeys, StatusStore};
pub use store::{AccessPolicy, InMemoryObjectStore, LocalFsObjectStore, ObjectStore};
pub use worker::{CycleReport, Worker};
