//! Device camera contract.
//!
//! A [`CameraDevice`] hands out [`MediaStream`]s for a set of constraints.
//! The capture controller keeps at most one stream alive, wrapped in a
//! [`StreamGuard`] that stops it on release or drop.

use crate::error::CameraError;
use crate::processing::RawImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera.
    User,
    /// Rear camera.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn opposite(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl StreamConstraints {
    pub fn new(facing: FacingMode) -> Self {
        Self {
            facing,
            ideal_width: None,
            ideal_height: None,
        }
    }

    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.ideal_width = width;
        self.ideal_height = height;
        self
    }
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Opens a stream matching `constraints`.
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError>;
}

#[async_trait]
pub trait MediaStream: Send {
    fn facing(&self) -> FacingMode;

    /// Current frame as raw image data.
    async fn grab_frame(&mut self) -> Result<RawImage, CameraError>;

    /// Releases the device. Must tolerate repeated calls.
    fn stop(&mut self);
}

/// Sole owner of an open stream; stops it exactly once.
pub struct StreamGuard {
    stream: Option<Box<dyn MediaStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn facing(&self) -> Option<FacingMode> {
        self.stream.as_ref().map(|s| s.facing())
    }

    pub async fn grab_frame(&mut self) -> Option<Result<RawImage, CameraError>> {
        match self.stream.as_mut() {
            Some(stream) => Some(stream.grab_frame().await),
            None => None,
        }
    }

    /// Stops the stream. Returns `false` when it was already released.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                log::debug!("Released {} camera stream", stream.facing());
                true
            }
            None => false,
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera backed by still image files, one per facing mode.
///
/// Useful on hosts without a camera and for driving the capture pipeline
/// from the command line.
#[derive(Debug, Clone, Default)]
pub struct StillImageCamera {
    sources: HashMap<FacingMode, PathBuf>,
    active: Arc<AtomicUsize>,
}

impl StillImageCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the same image for both facing modes.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new()
            .with_source(FacingMode::Environment, path.clone())
            .with_source(FacingMode::User, path)
    }

    pub fn with_source(mut self, facing: FacingMode, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(facing, path.into());
        self
    }

    /// Streams opened and not yet stopped.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn classify_io_error(path: &Path, err: io::Error) -> CameraError {
    let detail = format!("{}: {}", path.display(), err);
    match err.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(detail),
        _ => CameraError::DeviceUnavailable(detail),
    }
}

#[async_trait]
impl CameraDevice for StillImageCamera {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let path = self.sources.get(&constraints.facing).ok_or_else(|| {
            CameraError::ConstraintsNotSatisfiable(format!(
                "no {} camera available",
                constraints.facing
            ))
        })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| classify_io_error(path, e))?;

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StillImageStream {
            facing: constraints.facing,
            frame: bytes,
            active: Some(self.active.clone()),
        }))
    }
}

struct StillImageStream {
    facing: FacingMode,
    frame: Vec<u8>,
    active: Option<Arc<AtomicUsize>>,
}

#[async_trait]
impl MediaStream for StillImageStream {
    fn facing(&self) -> FacingMode {
        self.facing
    }

    async fn grab_frame(&mut self) -> Result<RawImage, CameraError> {
        if self.active.is_none() {
            return Err(CameraError::DeviceUnavailable(
                "stream already stopped".to_string(),
            ));
        }
        Ok(RawImage::Encoded(self.frame.clone()))
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_facing_mode_opposite_and_parse() {
        assert_eq!(FacingMode::User.opposite(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.opposite(), FacingMode::User);
        assert_eq!("rear".parse::<FacingMode>().unwrap(), FacingMode::Environment);
        assert_eq!("USER".parse::<FacingMode>().unwrap(), FacingMode::User);
        assert!("sideways".parse::<FacingMode>().is_err());
        assert_eq!(FacingMode::default(), FacingMode::Environment);
    }

    #[tokio::test]
    async fn test_missing_facing_is_unsatisfiable() {
        let camera = StillImageCamera::new();
        let result = camera
            .request_stream(&StreamConstraints::new(FacingMode::User))
            .await;
        assert!(matches!(
            result,
            Err(CameraError::ConstraintsNotSatisfiable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_device_unavailable() {
        let camera = StillImageCamera::single("/nonexistent/frame.jpg");
        let result = camera
            .request_stream(&StreamConstraints::new(FacingMode::Environment))
            .await;
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
        assert_eq!(camera.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_guard_releases_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"bytes").unwrap();
        let camera = StillImageCamera::single(&path);

        let stream = camera
            .request_stream(&StreamConstraints::new(FacingMode::Environment))
            .await
            .unwrap();
        let mut guard = StreamGuard::new(stream);
        assert_eq!(camera.active_streams(), 1);
        assert_eq!(guard.facing(), Some(FacingMode::Environment));
        assert!(matches!(
            guard.grab_frame().await,
            Some(Ok(RawImage::Encoded(ref b))) if b == b"bytes"
        ));

        assert!(guard.release());
        assert!(!guard.release());
        assert_eq!(camera.active_streams(), 0);
        assert!(guard.grab_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_guard_drop_stops_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"bytes").unwrap();
        let camera = StillImageCamera::single(&path);
        {
            let stream = camera
                .request_stream(&StreamConstraints::new(FacingMode::User))
                .await
                .unwrap();
            let _guard = StreamGuard::new(stream);
            assert_eq!(camera.active_streams(), 1);
        }
        assert_eq!(camera.active_streams(), 0);
    }
}
