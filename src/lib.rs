//! Offline-resilient photo capture and upload.
//!
//! Photos are compressed for the current network conditions, persisted in a
//! durable task queue and uploaded in the background with bounded
//! concurrency and exponential backoff.

pub mod backoff;
pub mod batch;
pub mod camera;
pub mod capture;
pub mod cli;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod formats;
pub mod info;
pub mod logger;
pub mod notifier;
pub mod processing;
pub mod profile;
pub mod queue;
pub mod store;
pub mod task;
pub mod upload;
pub mod utils;
pub mod validation;
pub mod walrus;

pub use backoff::BackoffPolicy;
pub use camera::{CameraDevice, FacingMode, MediaStream, StillImageCamera, StreamConstraints};
pub use capture::{CaptureContext, CaptureController, PhotoCount, UploadTaskHandle};
pub use config::{AppConfig, CaptureConfig, EndpointConfig, QueueConfig};
pub use endpoint::{HttpEndpoint, UploadEndpoint, UploadRequest};
pub use error::{
    CameraError, CaptureError, CompressionError, ConfigError, ImportError, QueueError, Result,
    StoreError, UploadError,
};
pub use formats::TargetFormat;
pub use notifier::{Completion, TaskOutcome};
pub use processing::{compress, compress_async, CompressedImage, RawImage};
pub use profile::{select_profile, CompressionProfile, NetworkHint, NetworkSignal};
pub use queue::{QueueSummary, SchedulerHandle, UploadQueue};
pub use store::{FileTaskStore, MemoryTaskStore, TaskStore};
pub use task::{TaskId, TaskMetadata, TaskResult, TaskStatus, UploadTask};
pub use walrus::{WalrusEndpoint, WalrusOptions};
