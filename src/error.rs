use crate::task::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a captured frame into an uploadable payload.
///
/// Never retried automatically: the capture itself has to be redone.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Source image is empty")]
    EmptySource,

    #[error("Source image is corrupt: {0}")]
    CorruptSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Invalid quality factor: {0}. Must be between 0 and 1")]
    InvalidQuality(f32),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No image files found in input path: {0}")]
    NoImageFilesFound(String),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),

    #[error("Batch memory limit exceeded: estimated {0}MB, maximum allowed {1}MB")]
    BatchMemoryLimitExceeded(u64, u64),

    #[error("Batch file count limit exceeded: {0} files, maximum allowed {1}")]
    BatchFileLimitExceeded(usize, usize),

    #[error(
        "Insufficient available memory: estimated batch requires {0}MB, but only {1}MB available"
    )]
    InsufficientMemory(u64, u64),

    #[error("Compression worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, CompressionError>;

/// Device camera failures. These need user action and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Camera constraints not satisfiable: {0}")]
    ConstraintsNotSatisfiable(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Photo limit reached: {max} photos already captured")]
    LimitReached { max: usize },

    #[error("Camera stream is not open")]
    NotOpen,

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A failed delivery attempt. Every variant is retryable up to the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response from upload endpoint: {0}")]
    InvalidResponse(String),

    #[error("Upload timed out after {0}ms")]
    Timeout(u64),

    #[error("Could not read task payload: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload missing for task {0}")]
    MissingPayload(TaskId),

    #[error("Task store worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Refusing to enqueue an empty payload")]
    EmptyPayload,

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Upload scheduler is already running")]
    AlreadyRunning,

    #[error("Upload queue shut down before the task completed")]
    Shutdown,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a whole bulk import, as opposed to a single skipped file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
