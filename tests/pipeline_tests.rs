// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the preview pipeline against the virtual camera

use edge_camera::backends::camera::{
    FixedDisplayRotation, OutputTarget, Rotation, Size, SessionConfig,
};
use edge_camera::backends::virtual_camera::{VirtualCamera, VirtualCameraOptions};
use edge_camera::errors::PhotoError;
use edge_camera::media::CpuProcessor;
use edge_camera::pipelines::photo::{StillCaptureSettings, StillRequestPolicy, decode_to_rgba};
use edge_camera::pipelines::preview::{DisplayImage, ModeSwitch, PreviewOptions, PreviewPipeline};
use edge_camera::ProcessingMode;
use edge_camera::relay::{RelayError, RelaySink};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl RelaySink for CollectingSink {
    fn send_text(&self, text: String) -> Result<(), RelayError> {
        self.messages.lock().unwrap().push(text);
        Ok(())
    }
}

fn camera(pixel_stride: usize) -> VirtualCamera {
    VirtualCamera::new(VirtualCameraOptions {
        preview_sizes: vec![Size::new(64, 48), Size::new(4000, 3000)],
        still_sizes: vec![Size::new(96, 72), Size::new(160, 120)],
        chroma_pixel_stride: pixel_stride,
        ..Default::default()
    })
}

fn fast_stills(policy: StillRequestPolicy) -> StillCaptureSettings {
    StillCaptureSettings {
        settle_delay: Duration::from_millis(20),
        policy,
        ..StillCaptureSettings::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_uses_selected_sizes() {
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera(2)),
        &FixedDisplayRotation(Rotation::None),
        PreviewOptions::new(Handle::current()),
    )
    .unwrap();

    assert_eq!(
        pipeline.session_config(),
        SessionConfig {
            preview_size: Size::new(64, 48),
            still_size: Size::new(160, 120),
        }
    );
    pipeline.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_planar_and_interleaved_chroma_both_stream() {
    for pixel_stride in [1, 2] {
        let mut options = PreviewOptions::new(Handle::current());
        options.processor = Some(Arc::new(CpuProcessor::new()));
        options.mode = ModeSwitch::new(ProcessingMode::Raw);
        let mut pipeline = PreviewPipeline::start(
            Box::new(camera(pixel_stride)),
            &FixedDisplayRotation(Rotation::Rotate270),
            options,
        )
        .unwrap();

        let display = pipeline.display();
        wait_until(|| display.borrow().as_ref().is_some_and(|f| f.sequence >= 3)).await;
        let frame = display.borrow().clone().unwrap();
        // Sensor at 90°, display at 270°: frames turn by 180°
        assert_eq!(pipeline.orientation().relative, Rotation::Rotate180);
        assert_eq!(frame.image.dimensions(), (64, 48));
        assert!(matches!(frame.image, DisplayImage::Rgba(_)));
        let failures = &pipeline.stats().conversion_failures;
        assert_eq!(failures.load(Ordering::Relaxed), 0);
        pipeline.stop();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mode_switch_applies_to_next_frames() {
    let mut options = PreviewOptions::new(Handle::current());
    options.processor = Some(Arc::new(CpuProcessor::new()));
    options.mode = ModeSwitch::new(ProcessingMode::Raw);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera(2)),
        &FixedDisplayRotation(Rotation::None),
        options,
    )
    .unwrap();

    let display = pipeline.display();
    wait_until(|| display.borrow().is_some()).await;
    pipeline.set_mode(ProcessingMode::Canny);
    wait_until(|| {
        display
            .borrow()
            .as_ref()
            .is_some_and(|f| f.mode == ProcessingMode::Canny)
    })
    .await;
    pipeline.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_processed_frames_are_relayed_at_bounded_rate() {
    let sink = Arc::new(CollectingSink::default());
    let mut options = PreviewOptions::new(Handle::current());
    options.processor = Some(Arc::new(CpuProcessor::new()));
    options.mode = ModeSwitch::new(ProcessingMode::Grayscale);
    options.relay = Some(sink.clone());
    options.relay_interval = Duration::from_millis(200);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera(2)),
        &FixedDisplayRotation(Rotation::None),
        options,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    pipeline.stop();

    let messages = sink.messages.lock().unwrap();
    assert!(!messages.is_empty());
    // 700 ms at one message per 200 ms
    assert!(messages.len() <= 4, "relayed {} messages", messages.len());
    assert!(pipeline.stats().displayed() > messages.len() as u64);

    let json: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
    assert_eq!(json["format"], "GRAYSCALE");
    assert_eq!(json["width"], 48);
    assert_eq!(json["height"], 64);
    assert!(json["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_still_capture_end_to_end() {
    let camera = camera(2);
    let probe = camera.probe();
    let mut options = PreviewOptions::new(Handle::current());
    options.still = fast_stills(StillRequestPolicy::Replace);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera),
        &FixedDisplayRotation(Rotation::None),
        options,
    )
    .unwrap();

    let still = pipeline.capture_still().unwrap().wait().await.unwrap();
    assert_eq!((still.width, still.height), (160, 120));
    // Device at 0°, sensor at 90°
    assert_eq!(still.orientation, 180);
    let decoded = decode_to_rgba(&still.data).unwrap();
    assert_eq!(decoded.dimensions(), (160, 120));

    // Preview kept streaming while the still was taken
    let before = probe.frames_generated();
    wait_until(|| probe.frames_generated() > before).await;

    let requests = probe.requests();
    let still_index = requests
        .iter()
        .position(|r| r.target == OutputTarget::Still)
        .unwrap();
    assert!(requests[..still_index].iter().any(|r| r.af_trigger));
    assert_eq!(probe.still_requests(), 1);
    pipeline.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replaced_request_is_abandoned() {
    let camera = camera(2);
    camera.probe().set_hold_stills(true);
    let mut options = PreviewOptions::new(Handle::current());
    options.still = fast_stills(StillRequestPolicy::Replace);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera),
        &FixedDisplayRotation(Rotation::None),
        options,
    )
    .unwrap();

    let first = pipeline.capture_still().unwrap();
    let second = pipeline.capture_still().unwrap();
    assert!(second.generation() > first.generation());
    assert!(matches!(first.wait().await, Err(PhotoError::Abandoned)));

    pipeline.stop();
    assert!(matches!(second.wait().await, Err(PhotoError::Abandoned)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reject_policy_refuses_second_request() {
    let camera = camera(2);
    camera.probe().set_hold_stills(true);
    let mut options = PreviewOptions::new(Handle::current());
    options.still = fast_stills(StillRequestPolicy::Reject);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera),
        &FixedDisplayRotation(Rotation::None),
        options,
    )
    .unwrap();

    let _first = pipeline.capture_still().unwrap();
    assert!(matches!(
        pipeline.capture_still(),
        Err(PhotoError::CaptureInProgress)
    ));
    pipeline.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_repeating_request_keeps_pipeline_alive() {
    let camera = camera(2);
    camera.probe().set_fail_submissions(true);
    let mut pipeline = PreviewPipeline::start(
        Box::new(camera),
        &FixedDisplayRotation(Rotation::None),
        PreviewOptions::new(Handle::current()),
    )
    .unwrap();

    assert!(pipeline.is_running());
    assert!(pipeline.display().borrow().is_none());
    pipeline.stop();
}
