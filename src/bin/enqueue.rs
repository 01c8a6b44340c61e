//! Upload files into the queue bucket
//!
//! ```text
//! hustler-enqueue photo1.jpg photo2.jpg
//! ```

use hustler::observability::init_tracing;
use hustler::config::StatusBackend;
use hustler::{HustlerConfig, Pipeline, ProcessorRegistry};
use std::path::PathBuf;
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(false);

    let files: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if files.is_empty() {
        eprintln!("usage: hustler-enqueue <file>...");
        std::process::exit(2);
    }

    let mut config = HustlerConfig::from_env()?;
    config.validate_producer()?;
    // Producers never read or write job status
    config.status_backend = StatusBackend::InMemory;
    let pipeline = Pipeline::from_config(&config, &ProcessorRegistry::with_defaults()).await?;

    let mut failures = 0;
    for path in &files {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read file");
                failures += 1;
                continue;
            }
        };
        match pipeline.enqueue(&content).await {
            Ok(key) => println!("{} -> {}/{}", path.display(), config.queue_bucket_name, key),
            Err(e) => {
                error!(path = %path.display(), error = %e, "enqueue failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
