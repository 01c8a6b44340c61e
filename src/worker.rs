//! Polling worker
//!
//! One cycle lists the queue, then claims and runs each unclaimed item in
//! listing order, awaiting every job before touching the next. A failure on
//! one item is logged and counted; it never stops the cycle.

use crate::job::{Job, JobStatus};
use crate::pipeline::Pipeline;
use std::io::Result as IoResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Keys returned by the listing, claimed or not
    pub listed: usize,
    /// Items this worker claimed and ran
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Already claimed, or lost to another worker
    pub skipped: usize,
    /// Items whose claim or run returned an error
    pub errors: usize,
}

impl CycleReport {
    pub fn merge(&mut self, other: &CycleReport) {
        self.listed += other.listed;
        self.dispatched += other.dispatched;
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct Worker {
    pipeline: Arc<Pipeline>,
}

impl Worker {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Worker { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Run one cycle. Only a listing failure is returned as an error.
    #[instrument(name = "cycle", skip_all, fields(queue = %self.pipeline.settings().queue_name))]
    pub async fn run(&self) -> IoResult<CycleReport> {
        let scan = self.pipeline.scan().await?;

        let mut report = CycleReport {
            listed: scan.listed,
            skipped: scan.claimed(),
            ..Default::default()
        };

        for item in &scan.available {
            let mut job = match Job::claim(&self.pipeline, &item.key).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(key = %item.key, error = %e, "claim failed");
                    report.errors += 1;
                    continue;
                }
            };

            report.dispatched += 1;
            match job.run().await {
                Ok(JobStatus::Completed) => report.completed += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    error!(job_id = %job.id(), key = %item.key, error = %e, "job errored");
                    report.errors += 1;
                }
            }
        }

        if report.dispatched > 0 {
            info!(
                listed = report.listed,
                completed = report.completed,
                failed = report.failed,
                errors = report.errors,
                "cycle finished"
            );
        } else {
            debug!(listed = report.listed, skipped = report.skipped, "nothing to do");
        }
        Ok(report)
    }

    /// Run cycles until the task is dropped, sleeping `interval` between
    /// them
    pub async fn poll_forever(&self, interval: Duration) {
        loop {
            if let Err(e) = self.run().await {
                error!(error = %e, "cycle aborted");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
