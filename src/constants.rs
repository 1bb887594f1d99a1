// Quality factors accepted by compression profiles.
pub const MIN_QUALITY: f32 = 0.4;
pub const MAX_QUALITY: f32 = 0.92;

// Profile table, worst network class first.
pub const SLOW_2G_MAX_DIMENSION: u32 = 640;
pub const SLOW_2G_QUALITY: f32 = 0.5;
pub const TWO_G_MAX_DIMENSION: u32 = 960;
pub const TWO_G_QUALITY: f32 = 0.6;
pub const THREE_G_MAX_DIMENSION: u32 = 1280;
pub const THREE_G_QUALITY: f32 = 0.75;
pub const FOUR_G_MAX_DIMENSION: u32 = 1920;
pub const FOUR_G_QUALITY: f32 = MAX_QUALITY;
/// Used when the network signal is missing or unrecognised.
pub const CONSERVATIVE_MAX_DIMENSION: u32 = 1024;
pub const CONSERVATIVE_QUALITY: f32 = 0.65;

pub const PREVIEW_MAX_DIMENSION: u32 = 320;
pub const PREVIEW_QUALITY: u8 = 60;

pub const MAX_IMAGE_DIMENSION: u32 = 16384;
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;

// Queue defaults.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 2;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.25;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_COMPLETED_RETENTION_SECS: u64 = 300;
pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 60_000;

// Capture defaults.
pub const DEFAULT_MAX_PHOTOS: usize = 10;

// Batch import limits.
pub const MAX_BATCH_FILES: usize = 500;
pub const MAX_BATCH_MEMORY_MIB: u64 = 2048;
pub const MIN_AVAILABLE_MEMORY_MIB: u64 = 256;
pub const LARGE_IMAGE_THRESHOLD_MIB: f64 = 50.0;
pub const MAX_CONCURRENT_LARGE_IMAGES: usize = 2;

pub const DEFAULT_STORE_DIR: &str = ".capture-queue";
pub const TASK_RECORD_DIR: &str = "tasks";
pub const TASK_PAYLOAD_DIR: &str = "payloads";

pub const DEFAULT_EPOCHS: u64 = 10;
pub const DEFAULT_WALRUS_AGGREGATOR: &str = "https://aggregator.walrus-testnet.walrus.space";
pub const DEFAULT_WALRUS_PUBLISHER: &str = "https://publisher.walrus-testnet.walrus.space";
pub const WALRUS_BLOB_PATH: &str = "/v1/blobs/";

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "gif"];

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
