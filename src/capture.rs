//! Capture controller: camera stream lifecycle, frame capture and hand-off
//! to the upload queue.
//!
//! `capture` returns as soon as the compressed photo is durably queued; the
//! upload itself happens in the background. Closing the controller never
//! cancels queued uploads.

use crate::camera::{CameraDevice, FacingMode, StreamGuard};
use crate::config::CaptureConfig;
use crate::error::{CameraError, CaptureError};
use crate::processing::compress_async;
use crate::profile::{profile_for, CompressionProfile, NetworkHint, NetworkSignal};
use crate::queue::UploadQueue;
use crate::task::{derive_filename, TaskId, TaskMetadata};
use crate::validation::validate_context_id;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Who is capturing, and for which inspection checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    pub inspection_id: String,
    pub checkpoint_id: String,
    pub user_id: String,
}

impl CaptureContext {
    pub fn new(
        inspection_id: impl Into<String>,
        checkpoint_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            inspection_id: inspection_id.into(),
            checkpoint_id: checkpoint_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_context_id("inspection id", &self.inspection_id)?;
        validate_context_id("checkpoint id", &self.checkpoint_id)?;
        validate_context_id("user id", &self.user_id)
    }
}

/// Returned by [`CaptureController::capture`] for optimistic UI binding.
#[derive(Debug, Clone)]
pub struct UploadTaskHandle {
    pub task_id: TaskId,
    pub filename: String,
    /// Local thumbnail to show until the remote URL is known.
    pub preview_data_uri: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub profile: CompressionProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoCount {
    pub captured: usize,
    pub max: usize,
    pub remaining: usize,
}

impl PhotoCount {
    pub fn is_limit_reached(&self) -> bool {
        self.remaining == 0
    }
}

pub struct CaptureController {
    camera: Arc<dyn CameraDevice>,
    queue: UploadQueue,
    network: Arc<dyn NetworkSignal>,
    context: CaptureContext,
    config: CaptureConfig,
    facing: FacingMode,
    stream: Option<StreamGuard>,
    captured: usize,
    last_capture_at: Option<DateTime<Utc>>,
}

impl CaptureController {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        queue: UploadQueue,
        network: Arc<dyn NetworkSignal>,
        context: CaptureContext,
        config: CaptureConfig,
    ) -> Self {
        Self {
            camera,
            queue,
            network,
            context,
            facing: config.facing,
            config,
            stream: None,
            captured: 0,
            last_capture_at: None,
        }
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamGuard::is_active)
    }

    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    pub fn photo_count(&self) -> PhotoCount {
        PhotoCount {
            captured: self.captured,
            max: self.config.max_photos,
            remaining: self.config.max_photos.saturating_sub(self.captured),
        }
    }

    /// Opens the camera for the current facing mode. A no-op when a stream
    /// for that mode is already open.
    pub async fn open(&mut self) -> Result<(), CameraError> {
        if self.is_open() && self.stream.as_ref().and_then(StreamGuard::facing) == Some(self.facing) {
            return Ok(());
        }
        self.release_stream();

        let constraints = self.config.constraints(self.facing);
        let stream = self.camera.request_stream(&constraints).await?;
        log::info!("Opened {} camera", self.facing);
        self.stream = Some(StreamGuard::new(stream));
        Ok(())
    }

    /// Grabs a frame, compresses it for the current network and enqueues it.
    ///
    /// The photo limit is checked before the camera or compressor is touched.
    /// A photo counts against the limit once it is queued, whatever happens
    /// to its upload afterwards.
    pub async fn capture(&mut self) -> Result<UploadTaskHandle, CaptureError> {
        let max = self.config.max_photos;
        if self.captured >= max {
            return Err(CaptureError::LimitReached { max });
        }

        let stream = self.stream.as_mut().ok_or(CaptureError::NotOpen)?;
        let raw = stream.grab_frame().await.ok_or(CaptureError::NotOpen)??;

        let raw_hint = self.network.effective_type();
        let hint = NetworkHint::parse(raw_hint.as_deref());
        let profile = profile_for(hint);
        let captured_at = self.next_capture_time();

        let compressed = compress_async(raw, profile).await?;
        let filename = derive_filename(&self.context.checkpoint_id, captured_at, compressed.format);
        let metadata = self.metadata(captured_at, hint);

        let task_id = self
            .queue
            .enqueue(compressed.blob, filename.clone(), metadata)
            .await?;
        self.captured += 1;
        log::info!(
            "Captured {} ({}x{}, {} bytes, {} profile), {} of {} photos",
            filename,
            compressed.width,
            compressed.height,
            compressed.size_bytes,
            hint,
            self.captured,
            max
        );

        Ok(UploadTaskHandle {
            task_id,
            filename,
            preview_data_uri: compressed.preview_data_uri,
            size_bytes: compressed.size_bytes,
            width: compressed.width,
            height: compressed.height,
            profile,
        })
    }

    /// Re-opens the stream with the opposite facing mode.
    ///
    /// When the controller is closed this only flips the mode used by the
    /// next `open`. If the new camera cannot be opened, the previous mode is
    /// restored and re-opened before the error is returned.
    pub async fn switch_facing(&mut self) -> Result<FacingMode, CameraError> {
        let previous = self.facing;
        self.facing = previous.opposite();
        if !self.is_open() {
            return Ok(self.facing);
        }

        self.release_stream();
        if let Err(e) = self.open().await {
            log::warn!("Could not switch to {} camera: {}", self.facing, e);
            self.facing = previous;
            if let Err(reopen) = self.open().await {
                log::error!("Could not reopen {} camera: {}", previous, reopen);
            }
            return Err(e);
        }
        Ok(self.facing)
    }

    /// Releases the camera. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.release_stream() {
            log::info!("Closed {} camera", self.facing);
        }
    }

    fn release_stream(&mut self) -> bool {
        self.stream.take().is_some_and(|mut guard| guard.release())
    }

    /// Capture timestamps are strictly increasing at millisecond resolution,
    /// which keeps derived filenames unique per controller.
    fn next_capture_time(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_capture_at {
            if now.timestamp_millis() <= last.timestamp_millis() {
                now = last + chrono::Duration::milliseconds(1);
            }
        }
        self.last_capture_at = Some(now);
        now
    }

    fn metadata(&self, captured_at: DateTime<Utc>, hint: NetworkHint) -> TaskMetadata {
        let mut metadata = TaskMetadata::new();
        metadata.insert("inspection_id".into(), self.context.inspection_id.clone());
        metadata.insert("checkpoint_id".into(), self.context.checkpoint_id.clone());
        metadata.insert("captured_by".into(), self.context.user_id.clone());
        metadata.insert(
            "captured_at".into(),
            captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        metadata.insert("facing".into(), self.facing.to_string());
        metadata.insert("network_hint".into(), hint.to_string());
        metadata
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.close();
    }
}
