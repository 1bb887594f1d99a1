#![allow(dead_code)]

use async_trait::async_trait;
use capture_queue::backoff::BackoffPolicy;
use capture_queue::camera::{CameraDevice, FacingMode, MediaStream, StreamConstraints};
use capture_queue::config::QueueConfig;
use capture_queue::endpoint::{UploadEndpoint, UploadRequest};
use capture_queue::error::{CameraError, UploadError};
use capture_queue::processing::RawImage;
use capture_queue::queue::UploadQueue;
use capture_queue::store::MemoryTaskStore;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// JPEG with enough texture that quality and size actually matter.
pub fn textured_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 3) % 256) as u8,
            ((x ^ y) % 256) as u8,
            ((x * y / 5) % 256) as u8,
        ])
    });
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode_image(&img)
        .unwrap();
    bytes
}

pub fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, textured_jpeg(width, height)).unwrap();
    path
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

/// Queue config with millisecond backoff so retries happen within a test.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        max_concurrent_uploads: 2,
        max_attempts: 3,
        backoff: BackoffPolicy::fixed(10),
        upload_timeout_ms: 2_000,
        completed_retention_secs: 3_600,
        prune_interval_ms: 60_000,
    }
}

pub fn memory_queue(config: QueueConfig) -> UploadQueue {
    UploadQueue::new(Arc::new(MemoryTaskStore::new()), config)
}

/// Endpoint answering from a per-filename script of failures, then success.
///
/// Records every call and the highest number of overlapping uploads.
#[derive(Default)]
pub struct ScriptedEndpoint {
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    always_fail: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Fail the next `times` uploads of `filename` before succeeding.
    pub fn fail_times(&self, filename: &str, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(filename.to_string()).or_default();
        for n in 0..times {
            queue.push_back(format!("scripted failure {}", n + 1));
        }
    }

    pub fn fail_always(&self, filename: &str) {
        self.always_fail.lock().unwrap().insert(filename.to_string());
    }

    pub fn calls(&self, filename: &str) -> usize {
        self.calls.lock().unwrap().get(filename).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadEndpoint for ScriptedEndpoint {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.filename.clone())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = if self.always_fail.lock().unwrap().contains(&request.filename) {
            Some("endpoint unavailable".to_string())
        } else {
            self.failures
                .lock()
                .unwrap()
                .get_mut(&request.filename)
                .and_then(VecDeque::pop_front)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match failure {
            Some(reason) => Err(UploadError::Transport(reason)),
            None => Ok(format!("https://store.test/{}", request.filename)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Camera serving a fixed frame, counting how often it is touched.
pub struct CountingCamera {
    frame: Vec<u8>,
    unavailable: HashSet<FacingMode>,
    pub requests: Arc<AtomicUsize>,
    pub frames: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
}

impl CountingCamera {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            frame,
            unavailable: HashSet::new(),
            requests: Arc::new(AtomicUsize::new(0)),
            frames: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without(mut self, facing: FacingMode) -> Self {
        self.unavailable.insert(facing);
        self
    }
}

#[async_trait]
impl CameraDevice for CountingCamera {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.contains(&constraints.facing) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{} camera is busy",
                constraints.facing
            )));
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingStream {
            facing: constraints.facing,
            frame: self.frame.clone(),
            frames: self.frames.clone(),
            active: Some(self.active.clone()),
        }))
    }
}

struct CountingStream {
    facing: FacingMode,
    frame: Vec<u8>,
    frames: Arc<AtomicUsize>,
    active: Option<Arc<AtomicUsize>>,
}

#[async_trait]
impl MediaStream for CountingStream {
    fn facing(&self) -> FacingMode {
        self.facing
    }

    async fn grab_frame(&mut self) -> Result<RawImage, CameraError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(RawImage::Encoded(self.frame.clone()))
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
