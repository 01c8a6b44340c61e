//! Deterministic Simulation Testing for the worker
//!
//! Seeded workload against a worker whose queue and processed buckets inject
//! faults. Items are enqueued and cycles run in a random interleaving; after
//! the run every item is checked against its final status.
//!
//! ```text
//! for seed in 0..1000 {
//!     let mut harness = WorkerDSTHarness::new(WorkerDSTConfig::chaos(seed));
//!     harness.run(200).await;
//!     harness.check_invariants().await;
//!     assert!(harness.result().is_success(), "seed {}", seed);
//! }
//! ```
//!
//! ## Invariants
//!
//! - The processor runs at most once per item
//! - `completed`: every expected output is stored and the source is gone
//! - `failed`: the source is still in the queue under its claimed key
//! - An item missing from the queue in both forms is `completed`
//! - Items whose processor yields nothing or faults never complete

use crate::claim::claimed_key;
use crate::content::content_hash;
use crate::job::JobStatus;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::processor::{Processor, ProcessorContext, ProcessorError, ProcessorOutput};
use crate::status::{InMemoryStatusStore, StatusKeys, StatusStore};
use crate::store::{
    InMemoryObjectStore, ObjectStore, PutOptions, SimulatedObjectStore, SimulatedStoreConfig,
    SimulatedStoreStats,
};
use crate::worker::{CycleReport, Worker};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Configuration for worker DST
#[derive(Debug, Clone)]
pub struct WorkerDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Fault configuration for both buckets
    pub store_config: SimulatedStoreConfig,
    /// Probability that a step runs a cycle rather than enqueueing
    pub cycle_probability: f64,
    /// Probability an item's processor returns nothing
    pub empty_probability: f64,
    /// Probability an item's processor faults
    pub fault_probability: f64,
    /// Probability an item's processor returns two outputs
    pub multi_probability: f64,
    /// Directory prefix for queue keys
    pub prefix: String,
}

impl Default for WorkerDSTConfig {
    fn default() -> Self {
        WorkerDSTConfig {
            seed: 0,
            store_config: SimulatedStoreConfig::default(),
            cycle_probability: 0.3,
            empty_probability: 0.1,
            fault_probability: 0.05,
            multi_probability: 0.2,
            prefix: "incoming/".to_string(),
        }
    }
}

impl WorkerDSTConfig {
    pub fn new(seed: u64) -> Self {
        WorkerDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm mode - no store faults, no processor faults
    pub fn calm(seed: u64) -> Self {
        WorkerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::no_faults(),
            fault_probability: 0.0,
            ..Default::default()
        }
    }

    /// Moderate fault injection
    pub fn moderate(seed: u64) -> Self {
        WorkerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::default(),
            ..Default::default()
        }
    }

    /// Chaos mode - aggressive fault injection
    pub fn chaos(seed: u64) -> Self {
        WorkerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::high_chaos(),
            empty_probability: 0.15,
            fault_probability: 0.15,
            ..Default::default()
        }
    }
}

/// How the processor treats an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// One output
    Single,
    /// Two outputs
    Multi,
    /// No output
    Empty,
    /// Processor error
    Fault,
}

impl ItemKind {
    fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Single => "single",
            ItemKind::Multi => "multi",
            ItemKind::Empty => "empty",
            ItemKind::Fault => "fault",
        }
    }

    fn parse(content: &[u8]) -> Option<ItemKind> {
        let text = std::str::from_utf8(content).ok()?;
        match text.rsplit_once(':')?.1 {
            "single" => Some(ItemKind::Single),
            "multi" => Some(ItemKind::Multi),
            "empty" => Some(ItemKind::Empty),
            "fault" => Some(ItemKind::Fault),
            _ => None,
        }
    }

    /// Outputs a run of this kind produces for `content`
    pub fn outputs(&self, content: &[u8]) -> Vec<Bytes> {
        match self {
            ItemKind::Single => vec![Bytes::from(content.to_ascii_uppercase())],
            ItemKind::Multi => vec![
                Bytes::from([content, &b"-a"[..]].concat()),
                Bytes::from([content, &b"-b"[..]].concat()),
            ],
            ItemKind::Empty | ItemKind::Fault => Vec::new(),
        }
    }
}

/// Processor whose behavior is encoded in the item content. Counts every
/// invocation by job id.
#[derive(Clone, Default)]
pub struct ScriptedProcessor {
    invocations: Arc<Mutex<HashMap<String, u32>>>,
}

impl ScriptedProcessor {
    pub fn invocations(&self, job_id: &str) -> u32 {
        self.invocations.lock().get(job_id).copied().unwrap_or(0)
    }
}

impl Processor for ScriptedProcessor {
    fn run<'a>(
        &'a self,
        ctx: ProcessorContext<'a>,
        content: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>> {
        Box::pin(async move {
            *self
                .invocations
                .lock()
                .entry(ctx.job_id().to_string())
                .or_insert(0) += 1;

            ctx.progress(0.5).await?;
            let kind = ItemKind::parse(&content)
                .ok_or_else(|| ProcessorError::other("unscripted content"))?;
            ctx.set("kind", kind.as_str()).await?;

            match kind {
                ItemKind::Fault => Err(ProcessorError::other("scripted fault")),
                ItemKind::Empty => Ok(ProcessorOutput::Empty),
                ItemKind::Single | ItemKind::Multi => {
                    ctx.progress(1.0).await?;
                    Ok(ProcessorOutput::Many(kind.outputs(&content)))
                }
            }
        })
    }
}

/// Item enqueued by the workload
#[derive(Debug, Clone)]
pub struct EnqueuedItem {
    pub key: String,
    pub content: Vec<u8>,
    pub kind: ItemKind,
}

/// Workload operation
#[derive(Debug, Clone)]
pub enum WorkerOperation {
    Enqueue(EnqueuedItem),
    Cycle,
}

/// Workload generator
pub struct WorkerWorkload {
    rng: ChaCha8Rng,
    config: WorkerDSTConfig,
    item_counter: u64,
}

impl WorkerWorkload {
    pub fn new(config: WorkerDSTConfig) -> Self {
        WorkerWorkload {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            item_counter: 0,
        }
    }

    pub fn next_operation(&mut self) -> WorkerOperation {
        if self.rng.gen_bool(self.config.cycle_probability) {
            return WorkerOperation::Cycle;
        }

        self.item_counter += 1;
        let roll: f64 = self.rng.gen();
        let kind = if roll < self.config.fault_probability {
            ItemKind::Fault
        } else if roll < self.config.fault_probability + self.config.empty_probability {
            ItemKind::Empty
        } else if roll
            < self.config.fault_probability
                + self.config.empty_probability
                + self.config.multi_probability
        {
            ItemKind::Multi
        } else {
            ItemKind::Single
        };

        let content = format!("item-{:06}:{}", self.item_counter, kind.as_str()).into_bytes();
        WorkerOperation::Enqueue(EnqueuedItem {
            key: format!("{}item-{:06}", self.config.prefix, self.item_counter),
            content,
            kind,
        })
    }
}

/// Result of a DST run
#[derive(Debug, Clone)]
pub struct WorkerDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub items_enqueued: u64,
    pub cycles: u64,
    /// Cycles aborted by a listing error
    pub aborted_cycles: u64,
    pub report: CycleReport,
    pub queue_stats: SimulatedStoreStats,
    pub processed_stats: SimulatedStoreStats,
    pub invariant_violations: Vec<String>,
}

impl WorkerDSTResult {
    pub fn new(seed: u64) -> Self {
        WorkerDSTResult {
            seed,
            total_operations: 0,
            items_enqueued: 0,
            cycles: 0,
            aborted_cycles: 0,
            report: CycleReport::default(),
            queue_stats: SimulatedStoreStats::default(),
            processed_stats: SimulatedStoreStats::default(),
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} items, {} cycles ({} aborted), {} completed, {} failed, {} errors, {} faults, {} violations",
            self.seed,
            self.items_enqueued,
            self.cycles,
            self.aborted_cycles,
            self.report.completed,
            self.report.failed,
            self.report.errors,
            self.queue_stats.total_faults() + self.processed_stats.total_faults(),
            self.invariant_violations.len()
        )
    }
}

type DSTStore = SimulatedObjectStore<InMemoryObjectStore>;

/// Main DST harness for the worker
pub struct WorkerDSTHarness {
    queue: DSTStore,
    processed: DSTStore,
    status: InMemoryStatusStore,
    status_keys: StatusKeys,
    processor: ScriptedProcessor,
    worker: Worker,
    workload: WorkerWorkload,
    items: Vec<EnqueuedItem>,
    result: WorkerDSTResult,
}

impl WorkerDSTHarness {
    pub fn new(config: WorkerDSTConfig) -> Self {
        let queue = SimulatedObjectStore::new(
            InMemoryObjectStore::named("queue"),
            config.seed.wrapping_add(1),
            config.store_config.clone(),
        );
        let processed = SimulatedObjectStore::new(
            InMemoryObjectStore::named("processed"),
            config.seed.wrapping_add(2),
            config.store_config.clone(),
        );
        let status = InMemoryStatusStore::new();
        let processor = ScriptedProcessor::default();

        let pipeline: Arc<Pipeline> = PipelineBuilder::new(
            Arc::new(queue.clone()),
            Arc::new(processed.clone()),
            Arc::new(status.clone()),
        )
        .processor(Arc::new(processor.clone()))
        .queue_prefix(config.prefix.clone())
        .build();
        let status_keys = pipeline.settings().status_keys.clone();

        WorkerDSTHarness {
            queue,
            processed,
            status,
            status_keys,
            processor,
            worker: Worker::new(pipeline),
            result: WorkerDSTResult::new(config.seed),
            workload: WorkerWorkload::new(config),
            items: Vec::new(),
        }
    }

    /// Run the workload for a number of steps, then drain with extra cycles
    pub async fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            let op = self.workload.next_operation();
            self.execute_operation(op).await;
        }
        for _ in 0..10 {
            self.execute_operation(WorkerOperation::Cycle).await;
        }
    }

    async fn execute_operation(&mut self, op: WorkerOperation) {
        self.result.total_operations += 1;
        match op {
            WorkerOperation::Enqueue(item) => {
                // Producers write straight to the bucket; faults belong to the worker side
                if self
                    .queue
                    .inner()
                    .put(&item.key, &item.content, PutOptions::default())
                    .await
                    .is_ok()
                {
                    self.result.items_enqueued += 1;
                    self.items.push(item);
                }
            }
            WorkerOperation::Cycle => {
                self.result.cycles += 1;
                match self.worker.run().await {
                    Ok(report) => self.result.report.merge(&report),
                    Err(_) => self.result.aborted_cycles += 1,
                }
            }
        }
    }

    /// Check every item against its final status
    pub async fn check_invariants(&mut self) {
        for item in &self.items {
            let violations = self.check_item(item).await;
            self.result.invariant_violations.extend(violations);
        }
        self.result.queue_stats = self.queue.stats();
        self.result.processed_stats = self.processed.stats();
    }

    async fn check_item(&self, item: &EnqueuedItem) -> Vec<String> {
        let mut violations = Vec::new();
        let id = content_hash(&item.content);
        let queue = self.queue.inner();
        let processed = self.processed.inner();

        let invocations = self.processor.invocations(&id);
        if invocations > 1 {
            violations.push(format!("{}: processor ran {} times", item.key, invocations));
        }

        let unclaimed = queue.exists(&item.key).await.unwrap_or(false);
        let claimed = queue.exists(&claimed_key(&item.key)).await.unwrap_or(false);
        let status = match self.status.hget(&self.status_keys.status, &id).await {
            Ok(Some(value)) => match value.parse::<JobStatus>() {
                Ok(status) => Some(status),
                Err(e) => {
                    violations.push(format!("{}: {}", item.key, e));
                    return violations;
                }
            },
            _ => None,
        };

        if unclaimed && claimed {
            violations.push(format!("{}: present both claimed and unclaimed", item.key));
        }

        match status {
            Some(JobStatus::Completed) => {
                if matches!(item.kind, ItemKind::Empty | ItemKind::Fault) {
                    violations.push(format!("{}: {:?} item completed", item.key, item.kind));
                }
                if unclaimed || claimed {
                    violations.push(format!("{}: completed but source remains", item.key));
                }
                for output in item.kind.outputs(&item.content) {
                    let hash = content_hash(&output);
                    if !processed.exists(&hash).await.unwrap_or(false) {
                        violations.push(format!("{}: output {} missing", item.key, hash));
                    }
                }
            }
            Some(JobStatus::Failed) => {
                if !claimed {
                    violations.push(format!("{}: failed but claimed source is gone", item.key));
                }
            }
            Some(JobStatus::Queued) | None => {
                if !unclaimed && !claimed {
                    violations.push(format!("{}: vanished without completing", item.key));
                }
            }
        }

        if status.is_none() && invocations > 0 {
            violations.push(format!("{}: processor ran without a status", item.key));
        }

        violations
    }

    pub fn result(&self) -> &WorkerDSTResult {
        &self.result
    }

    pub fn into_result(self) -> WorkerDSTResult {
        self.result
    }
}

/// Run a batch of DST tests with different seeds
pub async fn run_worker_dst_batch(
    base_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: impl Fn(u64) -> WorkerDSTConfig,
) -> Vec<WorkerDSTResult> {
    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let mut harness = WorkerDSTHarness::new(config_fn(base_seed + i as u64));
        harness.run(ops_per_run).await;
        harness.check_invariants().await;
        results.push(harness.into_result());
    }
    results
}

/// Summary of batch results
pub fn summarize_worker_batch(results: &[WorkerDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();
    let items: u64 = results.iter().map(|r| r.items_enqueued).sum();
    let completed: usize = results.iter().map(|r| r.report.completed).sum();
    let faults: u64 = results
        .iter()
        .map(|r| r.queue_stats.total_faults() + r.processed_stats.total_faults())
        .sum();

    let mut summary = format!(
        "Batch: {}/{} passed, {} items, {} completed, {} injected faults",
        passed, total, items, completed, faults
    );
    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }
    summary
}
