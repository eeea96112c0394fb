// SPDX-License-Identifier: GPL-3.0-only

//! Frame dispatch to the display, the processor and the relay
//!
//! Runs on the frame worker. Each upright NV21 frame is optionally processed
//! in the current mode, published to the render context through a `watch`
//! channel (the reader always sees one whole frame, possibly a stale one) and,
//! in processed modes, offered to the throttled relay.

use crate::media::{FrameProcessor, PackedFrame, ProcessingMode, RgbaFrame};
use crate::relay::{RelayFrame, ThrottledRelay};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Processing mode shared between the UI side and the frame worker
#[derive(Debug, Clone)]
pub struct ModeSwitch(Arc<AtomicU8>);

impl ModeSwitch {
    pub fn new(mode: ProcessingMode) -> Self {
        Self(Arc::new(AtomicU8::new(mode.code())))
    }

    pub fn get(&self) -> ProcessingMode {
        ProcessingMode::from_code(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set(&self, mode: ProcessingMode) {
        self.0.store(mode.code(), Ordering::Release);
    }

    /// Advance to the next mode and return it
    pub fn cycle(&self) -> ProcessingMode {
        let next = self.get().next();
        self.set(next);
        next
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::new(ProcessingMode::default())
    }
}

/// Pixels handed to the renderer
#[derive(Debug, Clone)]
pub enum DisplayImage {
    /// Upright NV21, used when no processor is installed
    Nv21(PackedFrame),
    /// Processor output
    Rgba(RgbaFrame),
}

impl DisplayImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DisplayImage::Nv21(f) => (f.width, f.height),
            DisplayImage::Rgba(f) => (f.width, f.height),
        }
    }
}

/// One published display frame
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    /// Increases by one per published frame
    pub sequence: u64,
    pub mode: ProcessingMode,
    pub image: DisplayImage,
    /// When the sensor captured the frame
    pub captured_at: Instant,
}

/// Receiving side of the display handoff
pub type DisplayReceiver = watch::Receiver<Option<Arc<DisplayFrame>>>;

/// Sending side of the display handoff
pub type DisplaySender = watch::Sender<Option<Arc<DisplayFrame>>>;

/// Counters updated by the frame worker
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_displayed: AtomicU64,
    pub conversion_failures: AtomicU64,
    pub processing_failures: AtomicU64,
    pub frames_relayed: AtomicU64,
}

impl PipelineStats {
    pub fn displayed(&self) -> u64 {
        self.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn relayed(&self) -> u64 {
        self.frames_relayed.load(Ordering::Relaxed)
    }
}

/// Result of dispatching one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published to the display (and possibly relayed)
    Displayed { relayed: bool },
    /// The processor could not handle the frame
    Dropped,
}

/// Hands converted frames to the renderer and the optional relay
pub struct FrameDispatcher {
    mode: ModeSwitch,
    processor: Option<Arc<dyn FrameProcessor>>,
    display: DisplaySender,
    relay: Option<ThrottledRelay>,
    stats: Arc<PipelineStats>,
    sequence: u64,
}

impl FrameDispatcher {
    pub fn new(
        mode: ModeSwitch,
        processor: Option<Arc<dyn FrameProcessor>>,
        display: DisplaySender,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            mode,
            processor,
            display,
            relay: None,
            stats,
            sequence: 0,
        }
    }

    pub fn with_relay(mut self, relay: ThrottledRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn dispatch(&mut self, frame: PackedFrame, captured_at: Instant) -> DispatchOutcome {
        self.dispatch_at(frame, captured_at, Instant::now())
    }

    /// Dispatch with an explicit clock for the relay throttle
    pub fn dispatch_at(
        &mut self,
        frame: PackedFrame,
        captured_at: Instant,
        now: Instant,
    ) -> DispatchOutcome {
        let mode = self.mode.get();

        let image = match &self.processor {
            Some(processor) => match processor.process(&frame, mode) {
                Some(rgba) => DisplayImage::Rgba(rgba),
                None => {
                    self.stats
                        .processing_failures
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(%mode, "Processor returned no frame, skipping");
                    return DispatchOutcome::Dropped;
                }
            },
            None => DisplayImage::Nv21(frame),
        };

        let mut relayed = false;
        if mode.is_processed() {
            if let (Some(relay), DisplayImage::Rgba(rgba)) = (self.relay.as_mut(), &image) {
                if relay.is_due(now) {
                    relayed = relay.offer_at(&RelayFrame::new(rgba.clone(), mode.label()), now);
                }
            }
        }
        if relayed {
            self.stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
        }

        self.sequence += 1;
        let display_frame = DisplayFrame {
            sequence: self.sequence,
            mode,
            image,
            captured_at,
        };
        // send_replace never fails, even with no receivers
        self.display.send_replace(Some(Arc::new(display_frame)));
        self.stats.frames_displayed.fetch_add(1, Ordering::Relaxed);
        trace!(sequence = self.sequence, %mode, relayed, "Frame dispatched");

        DispatchOutcome::Displayed { relayed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CpuProcessor;
    use crate::relay::tests::RecordingSink;
    use std::time::Duration;

    fn gray_frame() -> PackedFrame {
        PackedFrame::new(4, 4, vec![128; 24]).unwrap()
    }

    struct FailingProcessor;

    impl FrameProcessor for FailingProcessor {
        fn process(&self, _: &PackedFrame, _: ProcessingMode) -> Option<RgbaFrame> {
            None
        }
    }

    fn dispatcher(
        mode: ProcessingMode,
        processor: Option<Arc<dyn FrameProcessor>>,
    ) -> (FrameDispatcher, DisplayReceiver, Arc<RecordingSink>) {
        let (tx, rx) = watch::channel(None);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = FrameDispatcher::new(
            ModeSwitch::new(mode),
            processor,
            tx,
            Arc::new(PipelineStats::default()),
        )
        .with_relay(ThrottledRelay::new(sink.clone()));
        (dispatcher, rx, sink)
    }

    #[test]
    fn test_mode_switch_cycles() {
        let mode = ModeSwitch::new(ProcessingMode::Raw);
        assert_eq!(mode.cycle(), ProcessingMode::Grayscale);
        assert_eq!(mode.cycle(), ProcessingMode::Canny);
        assert_eq!(mode.cycle(), ProcessingMode::Raw);
        assert_eq!(mode.get(), ProcessingMode::Raw);
    }

    #[test]
    fn test_processed_mode_displays_and_relays() {
        let (mut dispatcher, rx, sink) =
            dispatcher(ProcessingMode::Grayscale, Some(Arc::new(CpuProcessor::new())));

        let now = Instant::now();
        let outcome = dispatcher.dispatch_at(gray_frame(), now, now);
        assert_eq!(outcome, DispatchOutcome::Displayed { relayed: true });

        let shown = rx.borrow().clone().unwrap();
        assert_eq!(shown.sequence, 1);
        assert!(matches!(shown.image, DisplayImage::Rgba(_)));
        assert!(sink.messages.lock().unwrap()[0].contains("\"format\":\"GRAYSCALE\""));
    }

    #[test]
    fn test_raw_mode_is_not_relayed() {
        let (mut dispatcher, _rx, sink) =
            dispatcher(ProcessingMode::Raw, Some(Arc::new(CpuProcessor::new())));
        let now = Instant::now();
        assert_eq!(
            dispatcher.dispatch_at(gray_frame(), now, now),
            DispatchOutcome::Displayed { relayed: false }
        );
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_relay_throttled_but_display_not() {
        let (mut dispatcher, rx, sink) =
            dispatcher(ProcessingMode::Canny, Some(Arc::new(CpuProcessor::new())));
        let start = Instant::now();
        for i in 0..5 {
            dispatcher.dispatch_at(gray_frame(), start, start + Duration::from_millis(i * 20));
        }
        assert_eq!(rx.borrow().as_ref().unwrap().sequence, 5);
        assert_eq!(sink.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_processor_failure_drops_frame() {
        let (mut dispatcher, rx, _sink) =
            dispatcher(ProcessingMode::Canny, Some(Arc::new(FailingProcessor)));
        assert_eq!(
            dispatcher.dispatch(gray_frame(), Instant::now()),
            DispatchOutcome::Dropped
        );
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn test_without_processor_shows_nv21() {
        let (mut dispatcher, rx, sink) = dispatcher(ProcessingMode::Canny, None);
        dispatcher.dispatch(gray_frame(), Instant::now());
        assert!(matches!(
            rx.borrow().as_ref().unwrap().image,
            DisplayImage::Nv21(_)
        ));
        assert!(sink.messages.lock().unwrap().is_empty());
    }
}
