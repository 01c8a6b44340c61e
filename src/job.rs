//! Job lifecycle
//!
//! A job owns one queue item from claim to a terminal status:
//!
//! ```text
//!            ┌──────────► completed   (outputs written, source deleted)
//! queued ────┤
//!            └──────────► failed      (source left claimed)
//! ```
//!
//! Neither terminal state has an exit and nothing retries a failed job. Its
//! claimed source stays in the queue bucket, invisible to workers, until an
//! operator deals with it.
//!
//! Status, progress, and data are write-through: every setter lands in the
//! status store immediately, so whatever a processor reported before a fault
//! is still readable afterwards.

use crate::claim::ClaimOutcome;
use crate::content::content_hash;
use crate::pipeline::{ConflictPolicy, Pipeline};
use crate::processor::{Processor, ProcessorContext, ProcessorError};
use crate::store::PutOptions;
use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::io::Error as IoError;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Job metadata as stored in the data hash
pub type JobData = Map<String, JsonValue>;

/// Lifecycle state persisted in the status hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Error type for job operations
#[derive(Debug)]
pub enum JobError {
    /// Object store or status store I/O
    Io(IoError),
    /// Data hash entry could not be encoded or decoded
    Json(serde_json::Error),
    /// The processor faulted
    Processor(ProcessorError),
    /// `run` on a job that was looked up by id
    NoSource(String),
    /// Progress outside [0.0, 1.0]
    InvalidProgress(f64),
    /// A status-store field holds something we did not write
    Corrupt {
        hash: String,
        id: String,
        value: String,
    },
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Io(e) => write!(f, "I/O error: {}", e),
            JobError::Json(e) => write!(f, "JSON error: {}", e),
            JobError::Processor(e) => write!(f, "{}", e),
            JobError::NoSource(id) => write!(f, "job {} has no source object to run", id),
            JobError::InvalidProgress(v) => write!(f, "progress {} is outside [0, 1]", v),
            JobError::Corrupt { hash, id, value } => {
                write!(f, "unreadable value {:?} in {} for job {}", value, hash, id)
            }
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::Io(e) => Some(e),
            JobError::Json(e) => Some(e),
            JobError::Processor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for JobError {
    fn from(e: IoError) -> Self {
        JobError::Io(e)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Json(e)
    }
}

impl From<ProcessorError> for JobError {
    fn from(e: ProcessorError) -> Self {
        JobError::Processor(e)
    }
}

/// Claimed queue object backing a job
#[derive(Debug, Clone)]
struct Source {
    key: String,
    content: Bytes,
}

/// One unit of work
pub struct Job {
    id: String,
    source: Option<Source>,
    outputs: Vec<String>,
    pipeline: Arc<Pipeline>,
}

impl Job {
    /// Claim the queue item at `key` and register it as `queued`.
    ///
    /// Returns `Ok(None)` when the item is already claimed or another worker
    /// took it first.
    pub async fn claim(pipeline: &Arc<Pipeline>, key: &str) -> Result<Option<Job>, JobError> {
        let queue = pipeline.queue();
        let claimed = match pipeline.claim_strategy().claim(queue.as_ref(), key).await? {
            ClaimOutcome::Claimed { key } => key,
            ClaimOutcome::AlreadyClaimed => {
                debug!(%key, "item already claimed, skipping");
                return Ok(None);
            }
            ClaimOutcome::Lost => {
                warn!(%key, "item disappeared before it could be claimed");
                return Ok(None);
            }
        };

        let content = Bytes::from(queue.get(&claimed).await?);
        let job = Job {
            id: content_hash(&content),
            source: Some(Source {
                key: claimed,
                content,
            }),
            outputs: Vec::new(),
            pipeline: pipeline.clone(),
        };
        job.set_status(JobStatus::Queued).await?;

        info!(job_id = %job.id, %key, "claimed");
        Ok(Some(job))
    }

    /// Claim the item at `key` and run it to a terminal state
    pub async fn run_item(pipeline: &Arc<Pipeline>, key: &str) -> Result<Option<Job>, JobError> {
        match Self::claim(pipeline, key).await? {
            Some(mut job) => {
                job.run().await?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Handle on an existing job. Touches neither store.
    pub fn find(pipeline: Arc<Pipeline>, id: impl Into<String>) -> Job {
        Job {
            id: id.into(),
            source: None,
            outputs: Vec::new(),
            pipeline,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claimed key of the source object, for jobs built by `claim`
    pub fn source_key(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.key.as_str())
    }

    /// Processed-store keys written by the last successful `run`
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Run the processor and settle the job.
    ///
    /// Faults after the claim (processor errors or panics, store I/O) mark
    /// the job `failed`, fire `on_error`, and are returned to the caller.
    #[instrument(name = "job", skip_all, fields(job_id = %self.id))]
    pub async fn run(&mut self) -> Result<JobStatus, JobError> {
        let content = match &self.source {
            Some(source) => source.content.clone(),
            None => return Err(JobError::NoSource(self.id.clone())),
        };
        let processor = self.pipeline.processor().clone();

        let result = AssertUnwindSafe(processor.run(ProcessorContext::new(self), content))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ProcessorError::from_panic(payload)));
        let streams = match result {
            Ok(output) => output.into_streams(),
            Err(e) => {
                warn!(error = %e, "processor faulted");
                self.fail_quietly(processor.as_ref()).await;
                return Err(e.into());
            }
        };

        let Some(streams) = streams else {
            info!("processor produced no output");
            self.mark_failed(processor.as_ref()).await?;
            return Ok(JobStatus::Failed);
        };

        if let Err(e) = self.complete(streams).await {
            warn!(error = %e, "could not finish job");
            self.fail_quietly(processor.as_ref()).await;
            return Err(e);
        }

        info!(outputs = self.outputs.len(), "completed");
        processor.on_complete(self);
        Ok(JobStatus::Completed)
    }

    /// Write every output, drop the source, then mark `completed`
    async fn complete(&mut self, streams: Vec<Bytes>) -> Result<(), JobError> {
        self.outputs.clear();
        for stream in &streams {
            let key = self.write_output(stream).await?;
            self.outputs.push(key);
        }

        if let Some(source) = &self.source {
            self.pipeline.queue().delete(&source.key).await?;
            debug!(key = %source.key, "deleted claimed source");
        }

        self.set_status(JobStatus::Completed).await
    }

    /// Store one output under its content hash
    async fn write_output(&self, stream: &[u8]) -> Result<String, JobError> {
        let settings = self.pipeline.settings();
        let key = self.pipeline.processed_key(&content_hash(stream));
        let processed = self.pipeline.processed();

        if settings.conflict_policy == ConflictPolicy::Skip && processed.exists(&key).await? {
            debug!(%key, "output already stored, skipping write");
            return Ok(key);
        }

        processed
            .put(&key, stream, PutOptions::with_access(settings.access_policy))
            .await?;
        debug!(%key, bytes = stream.len(), "stored output");
        Ok(key)
    }

    async fn mark_failed(&self, processor: &dyn Processor) -> Result<(), JobError> {
        let result = self.set_status(JobStatus::Failed).await;
        processor.on_error(self);
        result
    }

    async fn fail_quietly(&self, processor: &dyn Processor) {
        if let Err(e) = self.mark_failed(processor).await {
            warn!(error = %e, "could not record failed status");
        }
    }

    // ------------------------------------------------------------------------
    // Status store accessors
    // ------------------------------------------------------------------------

    /// Current status, `None` if nothing was ever recorded for this id
    pub async fn status(&self) -> Result<Option<JobStatus>, JobError> {
        let hash = &self.pipeline.settings().status_keys.status;
        match self.pipeline.status().hget(hash, &self.id).await? {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| self.corrupt(hash, value)),
        }
    }

    pub async fn set_status(&self, status: JobStatus) -> Result<(), JobError> {
        let hash = &self.pipeline.settings().status_keys.status;
        self.pipeline
            .status()
            .hset(hash, &self.id, status.as_str())
            .await?;
        Ok(())
    }

    /// Progress in [0.0, 1.0]; 0.0 when never reported
    pub async fn progress(&self) -> Result<f64, JobError> {
        let hash = &self.pipeline.settings().status_keys.progress;
        match self.pipeline.status().hget(hash, &self.id).await? {
            None => Ok(0.0),
            Some(value) => value.trim().parse().map_err(|_| self.corrupt(hash, value)),
        }
    }

    pub async fn set_progress(&self, value: f64) -> Result<(), JobError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(JobError::InvalidProgress(value));
        }
        let hash = &self.pipeline.settings().status_keys.progress;
        self.pipeline
            .status()
            .hset(hash, &self.id, &value.to_string())
            .await?;
        Ok(())
    }

    /// Metadata mapping; empty when never written
    pub async fn data(&self) -> Result<JobData, JobError> {
        let hash = &self.pipeline.settings().status_keys.data;
        match self.pipeline.status().hget(hash, &self.id).await? {
            None => Ok(JobData::new()),
            Some(value) => match serde_json::from_str::<JsonValue>(&value)? {
                JsonValue::Object(map) => Ok(map),
                _ => Err(self.corrupt(hash, value)),
            },
        }
    }

    /// Merge one entry into the metadata mapping
    pub async fn set_data(&self, key: &str, value: JsonValue) -> Result<(), JobError> {
        let mut data = self.data().await?;
        data.insert(key.to_string(), value);

        let hash = &self.pipeline.settings().status_keys.data;
        let encoded = serde_json::to_string(&data)?;
        self.pipeline.status().hset(hash, &self.id, &encoded).await?;
        Ok(())
    }

    fn corrupt(&self, hash: &str, value: String) -> JobError {
        JobError::Corrupt {
            hash: hash.to_string(),
            id: self.id.clone(),
            value,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("source", &self.source_key())
            .field("outputs", &self.outputs)
            .finish()
    }
}
