// SPDX-License-Identifier: GPL-3.0-only

//! Viewer session
//!
//! Mirrors the foreground lifecycle of a camera viewer: [`ViewerSession::resume`]
//! connects the relay and starts the camera, [`ViewerSession::pause`] stops
//! both. While running, the processing mode can be cycled and the current
//! frame saved.

pub mod display;

pub use display::{DisplayReader, FpsCounter};

use crate::backends::camera::{CameraDevice, DisplayRotationProvider};
use crate::config::Config;
use crate::errors::{AppError, AppResult, PhotoError};
use crate::media::{CpuProcessor, FrameProcessor, ProcessingMode, RgbaFrame};
use crate::pipelines::photo::decode_to_rgba;
use crate::pipelines::preview::{DisplayImage, ModeSwitch, PreviewOptions, PreviewPipeline};
use crate::relay::websocket::WsRelayClient;
use crate::relay::{RelayFrame, RelaySink, send_frame};
use crate::storage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Opens a fresh device each time the session resumes
pub type DeviceFactory = Box<dyn Fn() -> Box<dyn CameraDevice> + Send + Sync>;

/// Label used when relaying a saved still
const STILL_RELAY_LABEL: &str = "JPEG";

pub struct ViewerSession {
    config: Config,
    runtime: Handle,
    open_device: DeviceFactory,
    display_rotation: Arc<dyn DisplayRotationProvider>,
    processor: Arc<dyn FrameProcessor>,
    mode: ModeSwitch,
    pipeline: Option<PreviewPipeline>,
    client: Option<Arc<WsRelayClient>>,
    /// Sink supplied by the embedder, used instead of connecting `relay_url`
    fixed_sink: Option<Arc<dyn RelaySink>>,
}

impl ViewerSession {
    pub fn new(
        config: Config,
        runtime: Handle,
        open_device: DeviceFactory,
        display_rotation: Arc<dyn DisplayRotationProvider>,
    ) -> Self {
        let mode = ModeSwitch::new(config.processing_mode);
        Self {
            config,
            runtime,
            open_device,
            display_rotation,
            processor: Arc::new(CpuProcessor::new()),
            mode,
            pipeline: None,
            client: None,
            fixed_sink: None,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn FrameProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Relay through `sink` instead of the configured URL
    pub fn with_relay_sink(mut self, sink: Arc<dyn RelaySink>) -> Self {
        self.fixed_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> Option<&PreviewPipeline> {
        self.pipeline.as_ref()
    }

    /// Reader over the running pipeline's display frames
    pub fn display(&self) -> Option<DisplayReader> {
        self.pipeline
            .as_ref()
            .map(|pipeline| DisplayReader::new(pipeline.display()))
    }

    fn relay_sink(&self) -> Option<Arc<dyn RelaySink>> {
        match &self.client {
            Some(client) => Some(Arc::clone(client) as Arc<dyn RelaySink>),
            None => self.fixed_sink.clone(),
        }
    }

    pub fn is_relay_connected(&self) -> bool {
        self.relay_sink().is_some_and(|sink| sink.is_connected())
    }

    /// Connect the relay (if configured) and start the camera
    ///
    /// A relay failure is logged and the camera starts anyway. A camera
    /// failure, including denied permission, is returned.
    pub async fn resume(&mut self) -> AppResult<()> {
        if self.pipeline.is_some() {
            debug!("Session already running");
            return Ok(());
        }

        if self.client.is_none() && self.fixed_sink.is_none() {
            if let Some(url) = self.config.relay_url.clone() {
                match WsRelayClient::connect(&url).await {
                    Ok(client) => self.client = Some(Arc::new(client)),
                    Err(e) => warn!(url, error = %e, "Relay unavailable, continuing without it"),
                }
            }
        }

        let options = PreviewOptions {
            mode: self.mode.clone(),
            processor: Some(Arc::clone(&self.processor)),
            relay: self.relay_sink(),
            relay_interval: self.config.relay_interval(),
            still: self.config.still_settings(),
            runtime: self.runtime.clone(),
        };

        let pipeline =
            PreviewPipeline::start((self.open_device)(), self.display_rotation.as_ref(), options)?;
        info!(mode = %self.mode.get(), "Session resumed");
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Stop the camera and disconnect the relay
    pub async fn pause(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            // Joins worker threads
            if let Err(e) = tokio::task::spawn_blocking(move || pipeline.stop()).await {
                error!(error = %e, "Preview shutdown task failed");
            }
        }

        if let Some(client) = self.client.take() {
            match Arc::try_unwrap(client) {
                Ok(client) => client.close().await,
                Err(_) => debug!("Relay client still shared, closing on drop"),
            }
        }
        info!("Session paused");
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode.get()
    }

    /// Cycle RAW → GRAYSCALE → CANNY → RAW; applies from the next frame
    pub fn toggle_mode(&self) -> ProcessingMode {
        let mode = self.mode.cycle();
        info!(%mode, "Processing mode changed");
        mode
    }

    /// Save what the viewer is looking at
    ///
    /// In a processed mode the last displayed frame is written as PNG. In RAW
    /// mode a full-resolution still is captured and written as JPEG. Either
    /// way the image is also sent to the relay right away.
    pub async fn save_current_frame(&self) -> AppResult<PathBuf> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or(AppError::Photo(PhotoError::NoCameraSession))?;
        let output_dir = self.config.output_dir();
        let mode = self.mode.get();

        if mode.is_processed() {
            let frame = latest_processed_frame(pipeline).ok_or(PhotoError::NoFrameAvailable)?;
            self.relay_snapshot(frame.clone(), mode.label());
            let path = storage::save_processed(&output_dir, frame).await?;
            return Ok(path);
        }

        let still = pipeline.capture_still()?.wait().await?;
        info!(
            width = still.width,
            height = still.height,
            orientation = still.orientation,
            "Still captured"
        );
        let jpeg = still.data;

        if self.relay_sink().is_some() {
            let bytes = jpeg.clone();
            match tokio::task::spawn_blocking(move || decode_to_rgba(&bytes)).await {
                Ok(Ok(image)) => {
                    let frame = RgbaFrame {
                        width: image.width(),
                        height: image.height(),
                        data: image.into_raw(),
                    };
                    self.relay_snapshot(frame, STILL_RELAY_LABEL);
                }
                Ok(Err(e)) => warn!(error = %e, "Could not decode still for relay"),
                Err(e) => warn!(error = %e, "Still decode task failed"),
            }
        }

        let path = storage::save_photo(&output_dir, jpeg).await?;
        Ok(path)
    }

    fn relay_snapshot(&self, image: RgbaFrame, label: &str) {
        let Some(sink) = self.relay_sink() else {
            return;
        };
        if let Err(e) = send_frame(sink.as_ref(), &RelayFrame::new(image, label)) {
            warn!(error = %e, label, "Failed to relay snapshot");
        }
    }
}

fn latest_processed_frame(pipeline: &PreviewPipeline) -> Option<RgbaFrame> {
    let receiver = pipeline.display();
    let frame = receiver.borrow().clone()?;
    match &frame.image {
        DisplayImage::Rgba(rgba) if frame.mode.is_processed() => Some(rgba.clone()),
        _ => None,
    }
}
