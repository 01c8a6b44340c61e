use hustler::observability::init_tracing;
use hustler::{HustlerConfig, Pipeline, ProcessorRegistry, Worker};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(std::env::var("HUSTLER_LOG_JSON").is_ok_and(|v| v == "true" || v == "1"));

    let config = HustlerConfig::from_env()?;
    let pipeline = Pipeline::from_config(&config, &ProcessorRegistry::with_defaults()).await?;
    let worker = Worker::new(pipeline);

    if config.queue_is_ephemeral() {
        warn!("queue uses the memory store; nothing outside this process can enqueue into it");
    }

    println!(
        "Watching for incoming files in bucket '{}'...",
        config.queue_bucket_name
    );

    tokio::select! {
        _ = worker.poll_forever(config.poll_interval()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
