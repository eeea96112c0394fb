// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera device
//!
//! [`VirtualCamera`] implements [`CameraDevice`] without hardware. A
//! generator thread renders a moving test pattern into three strided YUV
//! planes, laid out the way real sensors deliver them:
//!
//! ```text
//! chroma_pixel_stride = 1          chroma_pixel_stride = 2
//! ┌───────────┐ ┌─────┐ ┌─────┐    ┌───────────┐ ┌───────────┐
//! │ Y + pad   │ │ U   │ │ V   │    │ Y + pad   │ │ V U V U … │ ← V plane at +0
//! └───────────┘ └─────┘ └─────┘    └───────────┘ └───────────┘   U plane at +1
//! ```
//!
//! Still requests are answered with a JPEG of the still size on the still
//! output. Faults can be injected through a [`VirtualCameraProbe`], which
//! also records every request the device receives.

use crate::backends::camera::{
    BackendError, BackendResult, CameraDevice, CaptureRequest, EncodedStill, FrameWorker,
    LoopAction, OutputTarget, Plane, RawFrame, Rotation, SessionConfig, SessionOutputs, Size,
};
use crate::constants::VIRTUAL_CAMERA_FPS;
use crate::pipelines::photo::encoding::encode_jpeg;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Static description of the virtual sensor
#[derive(Debug, Clone)]
pub struct VirtualCameraOptions {
    pub sensor_orientation: Rotation,
    pub preview_sizes: Vec<Size>,
    pub still_sizes: Vec<Size>,
    /// 1 for planar chroma, 2 for interleaved V,U memory
    pub chroma_pixel_stride: usize,
    /// Padding bytes appended to every plane row
    pub row_padding: usize,
    pub fps: u32,
}

impl Default for VirtualCameraOptions {
    fn default() -> Self {
        Self {
            sensor_orientation: Rotation::Rotate90,
            preview_sizes: vec![
                Size::new(640, 480),
                Size::new(1280, 720),
                Size::new(1920, 1080),
                Size::new(3840, 2160),
            ],
            still_sizes: vec![Size::new(1280, 960), Size::new(1600, 1200)],
            chroma_pixel_stride: 2,
            row_padding: 16,
            fps: VIRTUAL_CAMERA_FPS,
        }
    }
}

#[derive(Default)]
struct ProbeState {
    deny_permission: AtomicBool,
    fail_submissions: AtomicBool,
    hold_stills: AtomicBool,
    frames: AtomicU64,
    requests: Mutex<Vec<CaptureRequest>>,
}

/// Test handle for fault injection and request inspection
///
/// Cloned handles share state with the camera they came from, so a probe
/// keeps working after the camera has been moved into a pipeline.
#[derive(Clone, Default)]
pub struct VirtualCameraProbe {
    state: Arc<ProbeState>,
}

impl VirtualCameraProbe {
    /// Make the next `open` fail with `PermissionDenied`
    pub fn set_deny_permission(&self, deny: bool) {
        self.state.deny_permission.store(deny, Ordering::SeqCst);
    }

    /// Make `set_repeating_capture` and `capture_once` fail with `SubmissionFailed`
    pub fn set_fail_submissions(&self, fail: bool) {
        self.state.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Accept still requests without ever delivering the image
    pub fn set_hold_stills(&self, hold: bool) {
        self.state.hold_stills.store(hold, Ordering::SeqCst);
    }

    /// Every request accepted by the device so far, in submission order
    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Number of accepted still requests
    pub fn still_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.target == OutputTarget::Still)
            .count()
    }

    /// Preview frames generated so far
    pub fn frames_generated(&self) -> u64 {
        self.state.frames.load(Ordering::SeqCst)
    }

    fn record(&self, request: &CaptureRequest) {
        match self.state.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(e) => e.into_inner().push(request.clone()),
        }
    }
}

struct Session {
    config: SessionConfig,
    outputs: SessionOutputs,
    streaming: Arc<AtomicBool>,
    generator: FrameWorker,
}

/// Camera device backed by a generated test pattern
pub struct VirtualCamera {
    options: VirtualCameraOptions,
    probe: VirtualCameraProbe,
    session: Option<Session>,
}

impl VirtualCamera {
    pub fn new(options: VirtualCameraOptions) -> Self {
        Self {
            options,
            probe: VirtualCameraProbe::default(),
            session: None,
        }
    }

    /// Shared handle for fault injection and inspection
    pub fn probe(&self) -> VirtualCameraProbe {
        self.probe.clone()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn check_submission(&self) -> BackendResult<&Session> {
        let session = self.session.as_ref().ok_or(BackendError::NotOpen)?;
        if self.probe.state.fail_submissions.load(Ordering::SeqCst) {
            return Err(BackendError::SubmissionFailed(
                "Injected submission failure".into(),
            ));
        }
        Ok(session)
    }
}

impl Default for VirtualCamera {
    fn default() -> Self {
        Self::new(VirtualCameraOptions::default())
    }
}

impl CameraDevice for VirtualCamera {
    fn sensor_orientation(&self) -> Rotation {
        self.options.sensor_orientation
    }

    fn preview_sizes(&self) -> Vec<Size> {
        self.options.preview_sizes.clone()
    }

    fn still_sizes(&self) -> Vec<Size> {
        self.options.still_sizes.clone()
    }

    fn open(&mut self, config: &SessionConfig, outputs: SessionOutputs) -> BackendResult<()> {
        if self.probe.state.deny_permission.load(Ordering::SeqCst) {
            return Err(BackendError::PermissionDenied(
                "Virtual camera access denied".into(),
            ));
        }
        if self.session.is_some() {
            return Err(BackendError::SessionFailed("Session already open".into()));
        }

        info!(
            preview = %config.preview_size,
            still = %config.still_size,
            pixel_stride = self.options.chroma_pixel_stride,
            "Opening virtual camera"
        );

        let streaming = Arc::new(AtomicBool::new(false));
        let generator = spawn_generator(
            config.preview_size,
            &self.options,
            Arc::clone(&streaming),
            outputs.clone(),
            self.probe.clone(),
        )
        .map_err(|e| BackendError::SessionFailed(format!("Failed to spawn generator: {}", e)))?;

        self.session = Some(Session {
            config: *config,
            outputs,
            streaming,
            generator,
        });
        Ok(())
    }

    fn set_repeating_capture(&mut self, request: &CaptureRequest) -> BackendResult<()> {
        let session = self.check_submission()?;
        if request.target != OutputTarget::Preview {
            return Err(BackendError::SubmissionFailed(
                "Repeating requests must target the preview output".into(),
            ));
        }
        session.streaming.store(true, Ordering::SeqCst);
        self.probe.record(request);
        debug!("Repeating preview request set");
        Ok(())
    }

    fn capture_once(&mut self, request: &CaptureRequest) -> BackendResult<()> {
        let session = self.check_submission()?;
        self.probe.record(request);

        if request.target != OutputTarget::Still {
            debug!(af_trigger = request.af_trigger, "Preview request accepted");
            return Ok(());
        }
        if self.probe.state.hold_stills.load(Ordering::SeqCst) {
            debug!("Holding still request");
            return Ok(());
        }

        let size = session.config.still_size;
        let orientation = request.jpeg_orientation.unwrap_or(0);
        let quality = request.jpeg_quality.unwrap_or(100);
        let sender = session.outputs.still.clone();

        // Deliver asynchronously like a real still output
        std::thread::Builder::new()
            .name("virtual-still".into())
            .spawn(move || {
                let image = still_pattern(size);
                match encode_jpeg(&image, quality) {
                    Ok(data) => {
                        let still = EncodedStill {
                            data,
                            width: size.width,
                            height: size.height,
                            orientation,
                        };
                        if sender.send(still).is_err() {
                            debug!("Still output closed before delivery");
                        }
                    }
                    Err(e) => warn!(error = %e, "Virtual still encoding failed"),
                }
            })
            .map_err(|e| BackendError::SubmissionFailed(format!("Still worker: {}", e)))?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.streaming.store(false, Ordering::SeqCst);
            session.generator.stop();
            info!("Virtual camera closed");
        }
    }
}

impl Drop for VirtualCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_generator(
    size: Size,
    options: &VirtualCameraOptions,
    streaming: Arc<AtomicBool>,
    outputs: SessionOutputs,
    probe: VirtualCameraProbe,
) -> std::io::Result<FrameWorker> {
    let interval = Duration::from_secs(1) / options.fps.max(1);
    let pixel_stride = options.chroma_pixel_stride.clamp(1, 2);
    let padding = options.row_padding;
    let mut tick: u32 = 0;

    FrameWorker::start("virtual-camera", move || {
        let started = Instant::now();
        if streaming.load(Ordering::SeqCst) {
            let frame = test_pattern_frame(size, pixel_stride, padding, tick);
            outputs.preview.push(frame);
            probe.state.frames.fetch_add(1, Ordering::SeqCst);
            tick = tick.wrapping_add(1);
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
        LoopAction::Continue
    })
}

/// Render one frame of the moving test pattern
///
/// Luma is a diagonal ramp that shifts with `tick`; chroma varies across the
/// frame so V and U are distinguishable after conversion.
pub fn test_pattern_frame(
    size: Size,
    chroma_pixel_stride: usize,
    row_padding: usize,
    tick: u32,
) -> RawFrame {
    let (w, h) = (size.width as usize, size.height as usize);
    let (cw, ch) = (w / 2, h / 2);

    let y_stride = w + row_padding;
    let mut y = vec![0u8; y_stride * h];
    for row in 0..h {
        for col in 0..w {
            y[row * y_stride + col] = (col + row + tick as usize * 4) as u8;
        }
    }

    let v_at = |col: usize| (64 + (col * 128) / cw.max(1)) as u8;
    let u_at = |row: usize| (64 + (row * 128) / ch.max(1)) as u8;

    let (u, v) = if chroma_pixel_stride >= 2 {
        let stride = cw * 2 + row_padding;
        let mut vu = vec![0u8; stride * ch];
        for row in 0..ch {
            for col in 0..cw {
                vu[row * stride + col * 2] = v_at(col);
                vu[row * stride + col * 2 + 1] = u_at(row);
            }
        }
        let v = Plane::new(&vu[..vu.len() - 1], stride, 2);
        let u = Plane::new(&vu[1..], stride, 2);
        (u, v)
    } else {
        let stride = cw + row_padding;
        let mut u = vec![0u8; stride * ch];
        let mut v = vec![0u8; stride * ch];
        for row in 0..ch {
            for col in 0..cw {
                v[row * stride + col] = v_at(col);
                u[row * stride + col] = u_at(row);
            }
        }
        (Plane::new(u, stride, 1), Plane::new(v, stride, 1))
    };

    RawFrame {
        width: size.width,
        height: size.height,
        y: Plane::new(y, y_stride, 1),
        u,
        v,
        captured_at: Instant::now(),
    }
}

fn still_pattern(size: Size) -> RgbImage {
    let (w, h) = (size.width.max(1), size.height.max(1));
    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 128])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::FrameMailbox;
    use crate::media::yuv420_to_nv21;

    fn small_options() -> VirtualCameraOptions {
        VirtualCameraOptions {
            preview_sizes: vec![Size::new(64, 48)],
            still_sizes: vec![Size::new(32, 24)],
            fps: 100,
            ..Default::default()
        }
    }

    fn outputs() -> (SessionOutputs, crate::backends::camera::StillReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            SessionOutputs {
                preview: Arc::new(FrameMailbox::new()),
                still: tx,
            },
            rx,
        )
    }

    fn config() -> SessionConfig {
        SessionConfig {
            preview_size: Size::new(64, 48),
            still_size: Size::new(32, 24),
        }
    }

    #[test]
    fn test_pattern_planes_convert_identically() {
        let size = Size::new(8, 4);
        let planar = yuv420_to_nv21(&test_pattern_frame(size, 1, 3, 0)).unwrap();
        let interleaved = yuv420_to_nv21(&test_pattern_frame(size, 2, 5, 0)).unwrap();
        assert_eq!(planar, interleaved);
    }

    #[test]
    fn test_frames_only_after_repeating_request() {
        let mut camera = VirtualCamera::new(small_options());
        let probe = camera.probe();
        let (outputs, _still_rx) = outputs();
        let mailbox = Arc::clone(&outputs.preview);

        camera.open(&config(), outputs).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(mailbox.try_take().is_none());

        camera.set_repeating_capture(&CaptureRequest::preview()).unwrap();
        let frame = mailbox.take_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(probe.frames_generated() > 0);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_still_delivered_on_still_output() {
        let mut camera = VirtualCamera::new(small_options());
        let (outputs, mut still_rx) = outputs();
        camera.open(&config(), outputs).unwrap();

        camera.capture_once(&CaptureRequest::still(180, 100)).unwrap();
        let still = still_rx.blocking_recv().unwrap();
        assert_eq!((still.width, still.height), (32, 24));
        assert_eq!(still.orientation, 180);
        assert_eq!(&still.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_injected_faults() {
        let mut camera = VirtualCamera::new(small_options());
        let probe = camera.probe();

        probe.set_deny_permission(true);
        let (outputs, _rx) = outputs();
        assert!(matches!(
            camera.open(&config(), outputs),
            Err(BackendError::PermissionDenied(_))
        ));

        probe.set_deny_permission(false);
        let (outputs, _rx) = self::outputs();
        camera.open(&config(), outputs).unwrap();

        probe.set_fail_submissions(true);
        assert!(matches!(
            camera.capture_once(&CaptureRequest::autofocus_trigger()),
            Err(BackendError::SubmissionFailed(_))
        ));
        assert!(probe.requests().is_empty());
    }

    #[test]
    fn test_submission_requires_open_session() {
        let mut camera = VirtualCamera::new(small_options());
        assert_eq!(
            camera.capture_once(&CaptureRequest::preview()),
            Err(BackendError::NotOpen)
        );
    }
}
