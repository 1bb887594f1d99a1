use crate::backoff::BackoffPolicy;
use crate::camera::{FacingMode, StreamConstraints};
use crate::constants::{
    DEFAULT_COMPLETED_RETENTION_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_UPLOADS,
    DEFAULT_MAX_PHOTOS, DEFAULT_PRUNE_INTERVAL_MS, DEFAULT_STORE_DIR, DEFAULT_UPLOAD_TIMEOUT_MS,
};
use crate::error::ConfigError;
use crate::walrus::WalrusOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upload queue policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_uploads: usize,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub upload_timeout_ms: u64,
    /// How long terminal tasks stay in the completed log.
    pub completed_retention_secs: u64,
    pub prune_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            completed_retention_secs: DEFAULT_COMPLETED_RETENTION_SECS,
            prune_interval_ms: DEFAULT_PRUNE_INTERVAL_MS,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_uploads must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.upload_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "upload_timeout_ms must be positive".to_string(),
            ));
        }
        if self.prune_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "prune_interval_ms must be positive".to_string(),
            ));
        }
        self.backoff.validate().map_err(ConfigError::Invalid)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn completed_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.completed_retention_secs.min(i64::MAX as u64 / 1000) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ceiling on captured photos per controller, failed uploads included.
    pub max_photos: usize,
    pub facing: FacingMode,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_photos: DEFAULT_MAX_PHOTOS,
            facing: FacingMode::default(),
            ideal_width: None,
            ideal_height: None,
        }
    }
}

impl CaptureConfig {
    pub fn constraints(&self, facing: FacingMode) -> StreamConstraints {
        StreamConstraints::new(facing).with_resolution(self.ideal_width, self.ideal_height)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_photos == 0 {
            return Err(ConfigError::Invalid(
                "max_photos must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where uploads go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EndpointConfig {
    Http {
        url: String,
        #[serde(default)]
        auth_token: Option<String>,
    },
    Walrus(WalrusOptions),
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = match self {
            EndpointConfig::Http { url, .. } => url,
            EndpointConfig::Walrus(options) => &options.publisher_url,
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint url must be http(s): {}",
                url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_dir: PathBuf,
    pub endpoint: Option<EndpointConfig>,
    pub queue: QueueConfig,
    pub capture: CaptureConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            endpoint: None,
            queue: QueueConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue.validate()?;
        self.capture.validate()?;
        if let Some(endpoint) = &self.endpoint {
            endpoint.validate()?;
        }
        Ok(())
    }
}
