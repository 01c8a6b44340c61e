//! End-to-end pipeline tests
//!
//! Queue, processed bucket, and status store are all in memory; every
//! scenario drives the public API the way the worker binary does.

use bytes::Bytes;
use hustler::store::{ListResult, ObjectMeta, PutOptions, UrlOptions};
use hustler::{
    content_hash, AccessPolicy, ConflictPolicy, InMemoryObjectStore, InMemoryStatusStore, Job,
    JobError, JobStatus, ObjectStore, Pipeline, PipelineBuilder, Processor, ProcessorContext,
    ProcessorError, ProcessorOutput, Worker,
};
use parking_lot::Mutex;
use serde_json::json;
use std::future::Future;
use std::io::Result as IoResult;
use std::pin::Pin;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

struct Harness {
    queue: InMemoryObjectStore,
    processed: InMemoryObjectStore,
    status: InMemoryStatusStore,
    pipeline: Arc<Pipeline>,
}

impl Harness {
    fn new(processor: Arc<dyn Processor>) -> Self {
        Self::with(|builder| builder.processor(processor))
    }

    fn with(configure: impl FnOnce(PipelineBuilder) -> PipelineBuilder) -> Self {
        let queue = InMemoryObjectStore::named("queue.hustler.test");
        let processed = InMemoryObjectStore::named("processed.hustler.test");
        let status = InMemoryStatusStore::new();
        let builder = PipelineBuilder::new(
            Arc::new(queue.clone()),
            Arc::new(processed.clone()),
            Arc::new(status.clone()),
        );
        Harness {
            queue,
            processed,
            status,
            pipeline: configure(builder).build(),
        }
    }

    async fn deposit(&self, key: &str, content: &[u8]) {
        self.queue
            .put(key, content, PutOptions::default())
            .await
            .unwrap();
    }
}

/// Returns fixed outputs regardless of input
struct FixedProcessor(ProcessorOutput);

impl Processor for FixedProcessor {
    fn run<'a>(
        &'a self,
        _ctx: ProcessorContext<'a>,
        _content: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Records the content of every item it sees and the callbacks fired
#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<Vec<u8>>>,
    callbacks: Mutex<Vec<&'static str>>,
}

impl Processor for RecordingProcessor {
    fn run<'a>(
        &'a self,
        ctx: ProcessorContext<'a>,
        content: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen.lock().push(content.to_vec());
            ctx.progress(0.5).await?;
            ctx.set("test123", json!({"key": "value"})).await?;
            Ok(ProcessorOutput::Single(Bytes::from_static(b"FOOBAR")))
        })
    }

    fn on_complete(&self, _job: &Job) {
        self.callbacks.lock().push("completed");
    }

    fn on_error(&self, _job: &Job) {
        self.callbacks.lock().push("failed");
    }
}

/// Object store that panics on any call
struct UntouchableStore;

impl ObjectStore for UntouchableStore {
    fn put<'a>(
        &'a self,
        _key: &'a str,
        _data: &'a [u8],
        _options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        panic!("object store touched: put")
    }

    fn get<'a>(
        &'a self,
        _key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>> {
        panic!("object store touched: get")
    }

    fn exists<'a>(
        &'a self,
        _key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>> {
        panic!("object store touched: exists")
    }

    fn delete<'a>(
        &'a self,
        _key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        panic!("object store touched: delete")
    }

    fn list<'a>(
        &'a self,
        _prefix: &'a str,
        _continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>> {
        panic!("object store touched: list")
    }

    fn rename<'a>(
        &'a self,
        _from: &'a str,
        _to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        panic!("object store touched: rename")
    }

    fn head<'a>(
        &'a self,
        _key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        panic!("object store touched: head")
    }

    fn url_for<'a>(
        &'a self,
        _key: &'a str,
        _options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>> {
        panic!("object store touched: url_for")
    }
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[tokio::test]
async fn test_passthrough_stores_output_and_completes() {
    let h = Harness::with(|b| b);
    h.deposit("/the_bucket/filename", b"val").await;

    let job = Job::run_item(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.processed.keys(), vec![content_hash(b"val")]);
    assert_eq!(
        h.processed.get(&content_hash(b"val")).await.unwrap(),
        b"val"
    );
    assert_eq!(job.id(), content_hash(b"val"));
    assert_eq!(job.status().await.unwrap(), Some(JobStatus::Completed));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn test_claim_preserves_directory() {
    let h = Harness::with(|b| b);
    h.deposit("/the_bucket/filename", b"val").await;

    let job = Job::claim(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.source_key(), Some("/the_bucket/---LOCKED---filename"));
    assert_eq!(h.queue.keys(), vec!["/the_bucket/---LOCKED---filename"]);
    assert_eq!(job.status().await.unwrap(), Some(JobStatus::Queued));
}

#[tokio::test]
async fn test_multiple_outputs_stored_separately() {
    let h = Harness::new(Arc::new(FixedProcessor(ProcessorOutput::Many(vec![
        Bytes::from_static(b"FOO"),
        Bytes::from_static(b"BAR"),
    ]))));
    h.deposit("/the_bucket/filename", b"val").await;

    let job = Job::run_item(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    let mut expected = vec![content_hash(b"FOO"), content_hash(b"BAR")];
    assert_eq!(job.outputs(), expected.as_slice());
    expected.sort();
    assert_eq!(h.processed.keys(), expected);
}

#[tokio::test]
async fn test_no_output_fails_without_writes() {
    let h = Harness::new(Arc::new(FixedProcessor(ProcessorOutput::Empty)));
    h.deposit("/the_bucket/filename", b"val").await;

    let job = Job::run_item(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.status().await.unwrap(), Some(JobStatus::Failed));
    assert!(h.processed.is_empty());
    assert_eq!(h.queue.keys(), vec!["/the_bucket/---LOCKED---filename"]);
}

#[tokio::test]
async fn test_find_after_run_reads_completed() {
    let h = Harness::with(|b| b);
    h.deposit("/the_bucket/filename", b"val").await;
    let job = Job::run_item(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    let found = h.pipeline.find_job(job.id());

    assert_eq!(found.id(), job.id());
    assert_eq!(found.status().await.unwrap(), Some(JobStatus::Completed));
}

// =============================================================================
// Processor context and callbacks
// =============================================================================

#[tokio::test]
async fn test_progress_data_and_callbacks() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = Harness::new(processor.clone());
    h.deposit("/the_bucket/filename", b"val").await;

    let job = Job::run_item(&h.pipeline, "/the_bucket/filename")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.progress().await.unwrap(), 0.5);
    assert_eq!(
        job.data().await.unwrap().get("test123"),
        Some(&json!({"key": "value"}))
    );
    assert_eq!(*processor.callbacks.lock(), vec!["completed"]);
    assert_eq!(h.processed.keys(), vec![content_hash(b"FOOBAR")]);
}

#[tokio::test]
async fn test_failure_fires_error_callback() {
    struct Refuses(RecordingProcessor);

    impl Processor for Refuses {
        fn run<'a>(
            &'a self,
            _ctx: ProcessorContext<'a>,
            _content: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>>
        {
            Box::pin(async move { Ok(ProcessorOutput::Many(Vec::new())) })
        }

        fn on_error(&self, job: &Job) {
            self.0.on_error(job);
        }
    }

    let processor = Arc::new(Refuses(RecordingProcessor::default()));
    let h = Harness::new(processor.clone());
    h.deposit("item", b"val").await;

    Job::run_item(&h.pipeline, "item").await.unwrap();

    assert_eq!(*processor.0.callbacks.lock(), vec!["failed"]);
}

// =============================================================================
// Lookup by id
// =============================================================================

#[tokio::test]
async fn test_find_never_touches_object_store() {
    let status = InMemoryStatusStore::new();
    let pipeline = PipelineBuilder::new(
        Arc::new(UntouchableStore),
        Arc::new(UntouchableStore),
        Arc::new(status.clone()),
    )
    .build();

    let job = pipeline.find_job("deadbeef");
    job.set_status(JobStatus::Failed).await.unwrap();
    job.set_progress(0.25).await.unwrap();
    job.set_data("a", json!(1)).await.unwrap();
    job.set_data("b", json!("two")).await.unwrap();
    job.set_data("a", json!(3)).await.unwrap();

    let again = pipeline.find_job("deadbeef");
    assert_eq!(again.status().await.unwrap(), Some(JobStatus::Failed));
    assert_eq!(again.progress().await.unwrap(), 0.25);
    let data = again.data().await.unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data["a"], json!(3));
    assert_eq!(data["b"], json!("two"));
}

#[tokio::test]
async fn test_find_unknown_id_has_defaults() {
    let h = Harness::with(|b| b);
    let job = h.pipeline.find_job("0000000000000000000000000000000000000000");

    assert_eq!(job.status().await.unwrap(), None);
    assert_eq!(job.progress().await.unwrap(), 0.0);
    assert!(job.data().await.unwrap().is_empty());
    assert_eq!(h.status.hlen("hustler.status"), 0);
}

// =============================================================================
// Worker over the pipeline
// =============================================================================

#[tokio::test]
async fn test_worker_runs_items_in_listing_order() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = Harness::new(processor.clone());
    h.deposit("q/c", b"third").await;
    h.deposit("q/a", b"first").await;
    h.deposit("q/---LOCKED---b", b"held").await;
    h.deposit("q/b", b"second").await;

    let report = Worker::new(h.pipeline.clone()).run().await.unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        *processor.seen.lock(),
        vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
    );
    assert_eq!(h.queue.keys(), vec!["q/---LOCKED---b"]);
}

#[tokio::test]
async fn test_worker_ignores_locked_items() {
    let processor = Arc::new(RecordingProcessor::default());
    let h = Harness::new(processor.clone());
    h.deposit("/path/to/---LOCKED---file", b"val").await;

    let report = Worker::new(h.pipeline.clone()).run().await.unwrap();

    assert_eq!(report.listed, 1);
    assert_eq!(report.dispatched, 0);
    assert!(processor.seen.lock().is_empty());
    assert_eq!(h.queue.keys(), vec!["/path/to/---LOCKED---file"]);
}

#[tokio::test]
async fn test_enqueue_then_work() {
    let h = Harness::with(|b| b);
    let key = h.pipeline.enqueue(b"photo").await.unwrap();
    assert_eq!(h.pipeline.available().await.unwrap().len(), 1);

    let report = Worker::new(h.pipeline.clone()).run().await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(
        h.pipeline.find_job(key).status().await.unwrap(),
        Some(JobStatus::Completed)
    );
    assert!(h.pipeline.available().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_processor_fails_only_its_item() {
    /// Panics on "boom", echoes anything else
    #[derive(Default)]
    struct Volatile {
        callbacks: Mutex<Vec<(String, &'static str)>>,
    }

    impl Processor for Volatile {
        fn run<'a>(
            &'a self,
            _ctx: ProcessorContext<'a>,
            content: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>>
        {
            Box::pin(async move {
                if &content[..] == b"boom" {
                    panic!("decoder blew up");
                }
                Ok(ProcessorOutput::Single(content))
            })
        }

        fn on_complete(&self, job: &Job) {
            self.callbacks.lock().push((job.id().to_string(), "completed"));
        }

        fn on_error(&self, job: &Job) {
            self.callbacks.lock().push((job.id().to_string(), "failed"));
        }
    }

    let processor = Arc::new(Volatile::default());
    let h = Harness::new(processor.clone());
    h.deposit("a", b"boom").await;
    h.deposit("b", b"good").await;

    let report = Worker::new(h.pipeline.clone()).run().await.unwrap();

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(h.queue.keys(), vec!["---LOCKED---a"]);
    assert!(h.processed.exists(&content_hash(b"good")).await.unwrap());
    assert_eq!(h.processed.len(), 1);

    let boom = h.pipeline.find_job(content_hash(b"boom"));
    assert_eq!(boom.status().await.unwrap(), Some(JobStatus::Failed));
    assert_eq!(
        *processor.callbacks.lock(),
        vec![
            (content_hash(b"boom"), "failed"),
            (content_hash(b"good"), "completed"),
        ]
    );
}

#[tokio::test]
async fn test_panic_surfaces_as_processor_error() {
    struct Explodes;

    impl Processor for Explodes {
        fn run<'a>(
            &'a self,
            _ctx: ProcessorContext<'a>,
            content: Bytes,
        ) -> Pin<Box<dyn Future<Output = Result<ProcessorOutput, ProcessorError>> + Send + 'a>>
        {
            Box::pin(async move {
                if !content.is_empty() {
                    panic!("out of memory in {}", "resize");
                }
                Ok(ProcessorOutput::Single(content))
            })
        }
    }

    let h = Harness::new(Arc::new(Explodes));
    h.deposit("item", b"val").await;

    let mut job = Job::claim(&h.pipeline, "item").await.unwrap().unwrap();
    let err = job.run().await.unwrap_err();

    assert!(matches!(
        err,
        JobError::Processor(ProcessorError::Panicked(ref msg)) if msg == "out of memory in resize"
    ));
    assert_eq!(job.status().await.unwrap(), Some(JobStatus::Failed));
}

// =============================================================================
// Content addressing
// =============================================================================

#[tokio::test]
async fn test_identical_input_writes_same_key() {
    let h = Harness::with(|b| b);
    h.deposit("first/item", b"same bytes").await;
    h.deposit("second/item", b"same bytes").await;

    let a = Job::run_item(&h.pipeline, "first/item").await.unwrap().unwrap();
    let b = Job::run_item(&h.pipeline, "second/item").await.unwrap().unwrap();

    assert_eq!(a.outputs(), b.outputs());
    assert_eq!(h.processed.len(), 1);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn test_overwrite_policy_rewrites_with_new_access() {
    let h = Harness::with(|b| {
        b.conflict_policy(ConflictPolicy::Overwrite)
            .access_policy(AccessPolicy::PublicRead)
    });
    let hash = content_hash(b"val");
    h.processed
        .put(&hash, b"val", PutOptions::default())
        .await
        .unwrap();
    h.deposit("item", b"val").await;

    Job::run_item(&h.pipeline, "item").await.unwrap();

    assert_eq!(h.processed.access_of(&hash), Some(AccessPolicy::PublicRead));
}

#[tokio::test]
async fn test_skip_policy_keeps_existing_object() {
    let h = Harness::with(|b| b.access_policy(AccessPolicy::PublicRead));
    let hash = content_hash(b"val");
    h.processed
        .put(&hash, b"val", PutOptions::default())
        .await
        .unwrap();
    h.deposit("item", b"val").await;

    let job = Job::run_item(&h.pipeline, "item").await.unwrap().unwrap();

    assert_eq!(job.status().await.unwrap(), Some(JobStatus::Completed));
    assert_eq!(h.processed.access_of(&hash), Some(AccessPolicy::Private));
}

#[tokio::test]
async fn test_url_for_processed_output() {
    let h = Harness::with(|b| b.access_policy(AccessPolicy::PublicRead));
    let hash = content_hash(b"val");

    let url = h.pipeline.url_for(&hash).await.unwrap();

    assert_eq!(url, format!("memory://processed.hustler.test/{}", hash));
}
