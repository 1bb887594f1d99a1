mod common;

use capture_queue::camera::{FacingMode, StillImageCamera};
use capture_queue::capture::{CaptureContext, CaptureController};
use capture_queue::config::CaptureConfig;
use capture_queue::error::{CameraError, CaptureError};
use capture_queue::profile::StaticNetworkSignal;
use capture_queue::queue::UploadQueue;
use capture_queue::task::TaskStatus;
use common::{
    create_temp_directory, fast_config, memory_queue, textured_jpeg, write_test_image,
    CountingCamera, ScriptedEndpoint,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn context() -> CaptureContext {
    CaptureContext::new("INS-7", "CP 3/north", "inspector-1")
}

fn controller_with(
    camera: Arc<dyn capture_queue::camera::CameraDevice>,
    queue: UploadQueue,
    hint: Option<&str>,
    max_photos: usize,
) -> CaptureController {
    let config = CaptureConfig {
        max_photos,
        ..CaptureConfig::default()
    };
    CaptureController::new(
        camera,
        queue,
        Arc::new(StaticNetworkSignal::new(hint)),
        context(),
        config,
    )
}

#[tokio::test]
async fn test_capture_queues_compressed_photo_with_metadata() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(1600, 1200)));
    let mut controller = controller_with(camera, queue.clone(), Some("3g"), 5);

    controller.open().await.unwrap();
    let handle = controller.capture().await.unwrap();

    assert!(handle.filename.starts_with("checkpoint-CP_3_north-"));
    assert!(handle.filename.ends_with(".jpg"));
    assert!(handle.preview_data_uri.starts_with("data:image/jpeg;base64,"));
    assert!(handle.width.max(handle.height) <= handle.profile.max_dimension_px);

    let task = queue.task(handle.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.size_bytes, handle.size_bytes);
    assert_eq!(task.metadata["inspection_id"], "INS-7");
    assert_eq!(task.metadata["checkpoint_id"], "CP 3/north");
    assert_eq!(task.metadata["captured_by"], "inspector-1");
    assert_eq!(task.metadata["network_hint"], "3g");
    assert_eq!(task.metadata["facing"], "environment");
    assert!(task.metadata.contains_key("captured_at"));

    assert_eq!(controller.photo_count().captured, 1);
    assert_eq!(controller.photo_count().remaining, 4);
}

#[tokio::test]
async fn test_limit_is_checked_before_camera_is_touched() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(320, 240)));
    let frames = camera.frames.clone();
    let mut controller = controller_with(camera, queue.clone(), None, 2);

    controller.open().await.unwrap();
    controller.capture().await.unwrap();
    controller.capture().await.unwrap();
    assert_eq!(frames.load(Ordering::SeqCst), 2);

    let err = controller.capture().await.unwrap_err();
    assert!(matches!(err, CaptureError::LimitReached { max: 2 }));
    assert_eq!(frames.load(Ordering::SeqCst), 2);
    assert!(controller.photo_count().is_limit_reached());
    assert_eq!(queue.summary().await.unwrap().total(), 2);
}

#[tokio::test]
async fn test_failed_compression_does_not_use_a_slot() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(b"definitely not an image".to_vec()));
    let mut controller = controller_with(camera, queue.clone(), None, 1);

    controller.open().await.unwrap();
    let err = controller.capture().await.unwrap_err();
    assert!(matches!(err, CaptureError::Compression(_)));
    assert_eq!(controller.photo_count().captured, 0);
    assert_eq!(queue.summary().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_capture_requires_open_stream() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(64, 64)));
    let mut controller = controller_with(camera, queue, None, 3);

    assert!(matches!(
        controller.capture().await,
        Err(CaptureError::NotOpen)
    ));
}

#[tokio::test]
async fn test_slow_network_produces_smaller_upload() {
    let frame = textured_jpeg(2400, 1600);

    let slow_queue = memory_queue(fast_config());
    let mut slow = controller_with(
        Arc::new(CountingCamera::new(frame.clone())),
        slow_queue,
        Some("slow-2g"),
        1,
    );
    slow.open().await.unwrap();
    let slow_handle = slow.capture().await.unwrap();

    let fast_queue = memory_queue(fast_config());
    let mut fast = controller_with(
        Arc::new(CountingCamera::new(frame)),
        fast_queue,
        Some("4g"),
        1,
    );
    fast.open().await.unwrap();
    let fast_handle = fast.capture().await.unwrap();

    assert!(slow_handle.size_bytes < fast_handle.size_bytes);
    assert!(slow_handle.width < fast_handle.width);
}

#[tokio::test]
async fn test_switch_facing_reopens_stream() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(64, 64)));
    let active = camera.active.clone();
    let mut controller = controller_with(camera, queue, None, 3);

    controller.open().await.unwrap();
    assert_eq!(controller.facing(), FacingMode::Environment);

    let facing = controller.switch_facing().await.unwrap();
    assert_eq!(facing, FacingMode::User);
    assert!(controller.is_open());
    assert_eq!(active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_switch_facing_failure_restores_previous_camera() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(64, 64)).without(FacingMode::User));
    let active = camera.active.clone();
    let mut controller = controller_with(camera, queue, None, 3);

    controller.open().await.unwrap();
    let err = controller.switch_facing().await.unwrap_err();
    assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    assert_eq!(controller.facing(), FacingMode::Environment);
    assert!(controller.is_open());
    assert_eq!(active.load(Ordering::SeqCst), 1);
    controller.capture().await.unwrap();
}

#[tokio::test]
async fn test_switch_facing_while_closed_only_changes_mode() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(64, 64)));
    let requests = camera.requests.clone();
    let mut controller = controller_with(camera, queue, None, 3);

    assert_eq!(controller.switch_facing().await.unwrap(), FacingMode::User);
    assert_eq!(requests.load(Ordering::SeqCst), 0);
    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_close_is_idempotent_and_keeps_uploads() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(200, 150)));
    let active = camera.active.clone();
    let mut controller = controller_with(camera, queue.clone(), Some("4g"), 3);

    controller.open().await.unwrap();
    let handle = controller.capture().await.unwrap();
    controller.close();
    controller.close();
    drop(controller);
    assert_eq!(active.load(Ordering::SeqCst), 0);

    let scheduler = queue.start(Arc::new(ScriptedEndpoint::new())).unwrap();
    let outcome = queue
        .subscribe(handle.task_id)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(outcome.is_success());
    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_open_is_a_noop_when_already_open() {
    let queue = memory_queue(fast_config());
    let camera = Arc::new(CountingCamera::new(textured_jpeg(64, 64)));
    let requests = camera.requests.clone();
    let mut controller = controller_with(camera, queue, None, 3);

    controller.open().await.unwrap();
    controller.open().await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_still_image_camera_missing_file_is_unavailable() {
    let dir = create_temp_directory();
    let camera = Arc::new(StillImageCamera::single(dir.path().join("missing.jpg")));
    let mut controller = controller_with(camera, memory_queue(fast_config()), None, 1);

    let err = controller.open().await.unwrap_err();
    assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    assert!(!controller.is_open());
}

#[tokio::test]
async fn test_still_image_camera_captures_from_file() {
    let dir = create_temp_directory();
    let path = write_test_image(dir.path(), "frame.jpg", 640, 480);
    let camera = Arc::new(StillImageCamera::single(path));
    let mut controller = controller_with(camera.clone(), memory_queue(fast_config()), Some("2g"), 1);

    controller.open().await.unwrap();
    assert_eq!(camera.active_streams(), 1);
    let handle = controller.capture().await.unwrap();
    assert!(handle.size_bytes > 0);
    controller.close();
    assert_eq!(camera.active_streams(), 0);
}
