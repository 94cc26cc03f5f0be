//! Client-side upload orchestration.
//!
//! Drives the upload session coordinator from the uploading client:
//! chunked reads from the source file, bounded-concurrency part transfer
//! with retry and backoff, progress aggregation over an event bus,
//! cooperative cancellation, and stuck-task recovery.

pub mod error;
pub mod http;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod source;
pub mod sweeper;
pub mod tasks;
pub mod transport;

pub use error::{UploaderError, UploaderResult};
pub use http::HttpSessionClient;
pub use orchestrator::{SessionClient, UploadOrchestrator, UploaderConfig};
pub use progress::{ProgressBus, UploadEvent};
pub use retry::PartRetryPolicy;
pub use source::{FilePartSource, PartSource};
pub use sweeper::StuckTaskSweeper;
pub use tasks::TaskStore;
pub use transport::{HttpPartTransport, PartTransport};
