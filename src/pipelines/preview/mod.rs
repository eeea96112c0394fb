// SPDX-License-Identifier: GPL-3.0-only

//! Live preview pipeline
//!
//! ```text
//! CameraDevice ──RawFrame──▶ FrameMailbox ──▶ "preview-worker" thread
//!                                               │ yuv420_to_nv21
//!                                               │ rotate_nv21(relative)
//!                                               ▼
//!                                          FrameDispatcher ──▶ watch (display)
//!                                               └────────────▶ ThrottledRelay
//!
//! CameraDevice ──EncodedStill──▶ StillCaptureOrchestrator ──▶ StillCaptureHandle
//! ```
//!
//! The pipeline owns the device for the lifetime of the session. Stopping it
//! stops the worker first, then abandons pending stills and closes the device.

pub mod dispatcher;

pub use dispatcher::{
    DispatchOutcome, DisplayFrame, DisplayImage, DisplayReceiver, FrameDispatcher, ModeSwitch,
    PipelineStats,
};

use crate::backends::camera::{
    CameraDevice, CaptureRequest, DisplayRotationProvider, FrameMailbox, FrameWorker, LoopAction,
    Orientation, RawFrame, SessionConfig, SessionOutputs, select_largest_size,
    select_optimal_size,
};
use crate::constants::{FRAME_POLL_INTERVAL, RELAY_MIN_INTERVAL};
use crate::errors::{AppError, AppResult, PhotoError};
use crate::media::{FrameProcessor, ProcessingMode, rotate_nv21, yuv420_to_nv21};
use crate::pipelines::photo::{
    SharedDevice, StillCaptureHandle, StillCaptureOrchestrator, StillCaptureSettings, lock_device,
};
use crate::relay::{RelaySink, ThrottledRelay};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Everything the pipeline needs besides the device
pub struct PreviewOptions {
    pub mode: ModeSwitch,
    pub processor: Option<Arc<dyn FrameProcessor>>,
    pub relay: Option<Arc<dyn RelaySink>>,
    pub relay_interval: Duration,
    pub still: StillCaptureSettings,
    /// Runtime for still capture timers and completion
    pub runtime: Handle,
}

impl PreviewOptions {
    pub fn new(runtime: Handle) -> Self {
        Self {
            mode: ModeSwitch::default(),
            processor: None,
            relay: None,
            relay_interval: RELAY_MIN_INTERVAL,
            still: StillCaptureSettings::default(),
            runtime,
        }
    }
}

/// A running preview session
pub struct PreviewPipeline {
    device: SharedDevice,
    mailbox: Arc<FrameMailbox<RawFrame>>,
    worker: Option<FrameWorker>,
    stills: StillCaptureOrchestrator,
    display: DisplayReceiver,
    orientation: Orientation,
    session: SessionConfig,
    mode: ModeSwitch,
    stats: Arc<PipelineStats>,
    stopped: bool,
}

impl PreviewPipeline {
    /// Open the device and start streaming
    ///
    /// Orientation is resolved once here and kept for the whole session.
    /// A permission failure is returned before anything is started.
    pub fn start(
        mut device: Box<dyn CameraDevice>,
        display_rotation: &dyn DisplayRotationProvider,
        options: PreviewOptions,
    ) -> AppResult<Self> {
        let orientation = Orientation::resolve(device.sensor_orientation(), display_rotation);

        let preview_size = select_optimal_size(&device.preview_sizes());
        let still_size = select_largest_size(&device.still_sizes()).unwrap_or(preview_size);
        let session = SessionConfig {
            preview_size,
            still_size,
        };

        let mailbox = Arc::new(FrameMailbox::new());
        let (still_tx, still_rx) = mpsc::unbounded_channel();
        device.open(
            &session,
            SessionOutputs {
                preview: Arc::clone(&mailbox),
                still: still_tx,
            },
        )?;

        info!(
            preview = %preview_size,
            still = %still_size,
            rotation = orientation.relative.degrees(),
            mode = %options.mode.get(),
            "Preview session opened"
        );

        let (display_tx, display_rx) = watch::channel(None);
        let stats = Arc::new(PipelineStats::default());
        let mut dispatcher = FrameDispatcher::new(
            options.mode.clone(),
            options.processor,
            display_tx,
            Arc::clone(&stats),
        );
        if let Some(sink) = options.relay {
            dispatcher =
                dispatcher.with_relay(ThrottledRelay::with_interval(sink, options.relay_interval));
        }

        let worker_mailbox = Arc::clone(&mailbox);
        let worker_stats = Arc::clone(&stats);
        let rotation = orientation.relative;
        let worker = FrameWorker::start("preview-worker", move || {
            if worker_mailbox.is_closed() {
                return LoopAction::Stop;
            }
            let Some(raw) = worker_mailbox.take_timeout(FRAME_POLL_INTERVAL) else {
                return LoopAction::Continue;
            };
            let captured_at = raw.captured_at;
            match yuv420_to_nv21(&raw) {
                Ok(packed) => {
                    dispatcher.dispatch(rotate_nv21(packed, rotation), captured_at);
                }
                Err(e) => {
                    worker_stats
                        .conversion_failures
                        .fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Frame conversion failed, dropping frame");
                }
            }
            LoopAction::Continue
        });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                device.close();
                return Err(AppError::Other(format!(
                    "Failed to start preview worker: {}",
                    e
                )));
            }
        };

        if let Err(e) = device.set_repeating_capture(&CaptureRequest::preview()) {
            error!(error = %e, "Failed to start repeating preview request");
        }

        let device: SharedDevice = Arc::new(Mutex::new(device));
        let stills = StillCaptureOrchestrator::new(
            Arc::clone(&device),
            still_rx,
            orientation.still_orientation(),
            options.still,
            options.runtime,
        );

        Ok(Self {
            device,
            mailbox,
            worker: Some(worker),
            stills,
            display: display_rx,
            orientation,
            session,
            mode: options.mode,
            stats,
            stopped: false,
        })
    }

    /// Request a full-resolution still
    pub fn capture_still(&self) -> Result<StillCaptureHandle, PhotoError> {
        if self.stopped {
            return Err(PhotoError::NoCameraSession);
        }
        self.stills.request()
    }

    /// A new receiver for display frames
    pub fn display(&self) -> DisplayReceiver {
        self.display.clone()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session
    }

    pub fn mode(&self) -> &ModeSwitch {
        &self.mode
    }

    pub fn set_mode(&self, mode: ProcessingMode) {
        self.mode.set(mode);
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.stopped && self.worker.as_ref().is_some_and(FrameWorker::is_running)
    }

    /// Stop streaming and release the device; safe to call twice
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.mailbox.close();
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        self.stills.shutdown();
        lock_device(&self.device).close();

        info!(
            displayed = self.stats.displayed(),
            relayed = self.stats.relayed(),
            dropped = self.mailbox.replaced_count(),
            "Preview session stopped"
        );
    }
}

impl Drop for PreviewPipeline {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Preview pipeline dropped without stop");
            self.stop();
        }
    }
}
