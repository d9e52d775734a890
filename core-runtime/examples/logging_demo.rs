//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- pretty "core_runtime=trace"
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::env;
use tracing::{debug, info, instrument, warn};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some(_) => LogFormat::Pretty,
        None => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_pii_redaction(true);

    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(e) = init_logging(config) {
        eprintln!("logging init failed: {e}");
        return;
    }

    info!(format = ?format, "Logging initialized");

    let upload_url = "https://bucket.s3.amazonaws.com/uploads/movie.mkv?X-Amz-Signature=abc";
    info!(
        upload_url = %redact_if_sensitive("upload_url", upload_url),
        "Presigned upload issued"
    );

    simulate_upload("local-1", 4).await;
}

#[instrument]
async fn simulate_upload(file_id: &str, chunks: u32) {
    for chunk in 1..=chunks {
        debug!(file_id, percent = chunk * 100 / chunks, "Upload progress");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    warn!(file_id, "Server analysis is slow, falling back to polling");
}
