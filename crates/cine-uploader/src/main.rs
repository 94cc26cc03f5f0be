//! Upload CLI binary.
//!
//! Uploads a local media file to a content variant through the upload API:
//!
//! ```text
//! cine-uploader <file> <variant-id>
//! ```

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cine_models::{TaskStatus, VariantId};
use cine_uploader::{
    FilePartSource, HttpPartTransport, HttpSessionClient, PartSource, PartTransport, SessionClient,
    StuckTaskSweeper, UploadEvent, UploadOrchestrator, UploaderConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::from_default_env().add_directive("cine=info".parse().unwrap());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();

    let mut args = std::env::args().skip(1);
    let (file, variant_id) = match (args.next(), args.next()) {
        (Some(file), Some(variant)) => (file, VariantId::from_string(variant)),
        _ => {
            eprintln!("Usage: cine-uploader <file> <variant-id>");
            std::process::exit(2);
        }
    };

    let api_url =
        std::env::var("CINE_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let config = UploaderConfig::from_env();

    let client = match HttpSessionClient::new(&api_url) {
        Ok(c) => Arc::new(c) as Arc<dyn SessionClient>,
        Err(e) => {
            error!("Failed to create API client: {}", e);
            std::process::exit(1);
        }
    };

    let transport = match HttpPartTransport::new(config.part_timeout) {
        Ok(t) => Arc::new(t) as Arc<dyn PartTransport>,
        Err(e) => {
            error!("Failed to create part transport: {}", e);
            std::process::exit(1);
        }
    };

    let sweep_interval = config.sweep_interval;
    let orchestrator = UploadOrchestrator::new(config, client, transport);

    let sweeper = StuckTaskSweeper::new(orchestrator.clone(), sweep_interval);
    tokio::spawn(async move {
        sweeper.run().await;
    });

    let source = match FilePartSource::open(&file).await {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot open {}: {}", file, e);
            std::process::exit(1);
        }
    };

    let file_name = std::path::Path::new(&file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.clone());
    let content_type = guess_content_type(&file_name);

    info!(
        "Uploading {} ({} bytes) to variant {} via {}",
        file_name,
        source.byte_size(),
        variant_id,
        api_url
    );

    let mut events = orchestrator.bus().subscribe();
    let task_id = orchestrator
        .enqueue(Arc::new(source), variant_id, file_name, content_type)
        .await;

    loop {
        match events.recv().await {
            Ok(UploadEvent::TaskUpdated {
                task_id: id,
                status,
                bytes_sent,
                byte_size,
                progress,
            }) if id == task_id => {
                info!(
                    "{}: {}/{} bytes ({:.1}%)",
                    status,
                    bytes_sent,
                    byte_size,
                    progress * 100.0
                );
                match status {
                    TaskStatus::Ready => {
                        info!("Upload finished");
                        return;
                    }
                    TaskStatus::Cancelled => {
                        error!("Upload cancelled");
                        std::process::exit(1);
                    }
                    _ => {}
                }
            }
            Ok(UploadEvent::TaskFailed { task_id: id, message }) if id == task_id => {
                error!("Upload failed: {}", message);
                std::process::exit(1);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Event stream closed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Content type from the file extension; the API validates it.
fn guess_content_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) if ext == "mkv" => "video/x-matroska",
        Some(ext) if ext == "mov" => "video/quicktime",
        _ => "video/mp4",
    }
}
