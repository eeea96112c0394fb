// SPDX-License-Identifier: GPL-3.0-only

//! Render-context side of the preview handoff

use crate::pipelines::preview::{DisplayFrame, DisplayReceiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Frames-per-second estimate refreshed once per window
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    frames_in_window: u64,
    fps: f64,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames_in_window: 0,
            fps: 0.0,
        }
    }

    /// Count one rendered frame; returns the new value when the window rolled over
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.frames_in_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < FPS_WINDOW {
            return None;
        }
        self.fps = self.frames_in_window as f64 * 1000.0 / elapsed.as_millis() as f64;
        self.frames_in_window = 0;
        self.window_start = now;
        Some(self.fps)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// Reads the latest display frame, skipping any the renderer was too slow for
pub struct DisplayReader {
    receiver: DisplayReceiver,
    fps: FpsCounter,
    last_sequence: u64,
    skipped: u64,
}

impl DisplayReader {
    pub fn new(receiver: DisplayReceiver) -> Self {
        Self {
            receiver,
            fps: FpsCounter::new(Instant::now()),
            last_sequence: 0,
            skipped: 0,
        }
    }

    /// The newest frame if one arrived since the last call
    pub fn poll(&mut self) -> Option<Arc<DisplayFrame>> {
        if !self.receiver.has_changed().unwrap_or(false) {
            return None;
        }
        let frame = self.receiver.borrow_and_update().clone()?;
        self.account(&frame);
        Some(frame)
    }

    /// Wait for the next frame; `None` once the pipeline is gone
    pub async fn next_frame(&mut self) -> Option<Arc<DisplayFrame>> {
        loop {
            self.receiver.changed().await.ok()?;
            let latest = self.receiver.borrow_and_update().clone();
            if let Some(frame) = latest {
                self.account(&frame);
                return Some(frame);
            }
        }
    }

    fn account(&mut self, frame: &DisplayFrame) {
        if self.last_sequence != 0 && frame.sequence > self.last_sequence + 1 {
            self.skipped += frame.sequence - self.last_sequence - 1;
        }
        self.last_sequence = frame.sequence;
        self.fps.record(Instant::now());
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    /// Frames published but never rendered
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{PackedFrame, ProcessingMode};
    use crate::pipelines::preview::DisplayImage;
    use tokio::sync::watch;

    fn frame(sequence: u64) -> Option<Arc<DisplayFrame>> {
        Some(Arc::new(DisplayFrame {
            sequence,
            mode: ProcessingMode::Raw,
            image: DisplayImage::Nv21(PackedFrame::new(2, 2, vec![0; 6]).unwrap()),
            captured_at: Instant::now(),
        }))
    }

    #[test]
    fn test_fps_updates_once_per_second() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 1..30 {
            assert_eq!(counter.record(start + Duration::from_millis(i * 33)), None);
        }
        let fps = counter.record(start + Duration::from_millis(1000)).unwrap();
        assert!((fps - 30.0).abs() < f64::EPSILON);
        assert!((counter.fps() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_poll_returns_latest_only() {
        let (tx, rx) = watch::channel(None);
        let mut reader = DisplayReader::new(rx);
        assert!(reader.poll().is_none());

        tx.send_replace(frame(1));
        assert_eq!(reader.poll().unwrap().sequence, 1);
        assert!(reader.poll().is_none());

        tx.send_replace(frame(2));
        tx.send_replace(frame(3));
        tx.send_replace(frame(4));
        assert_eq!(reader.poll().unwrap().sequence, 4);
        assert_eq!(reader.skipped(), 2);
    }

    #[tokio::test]
    async fn test_next_frame_ends_with_sender() {
        let (tx, rx) = watch::channel(None);
        let mut reader = DisplayReader::new(rx);
        tx.send_replace(frame(1));
        assert_eq!(reader.next_frame().await.unwrap().sequence, 1);
        drop(tx);
        assert!(reader.next_frame().await.is_none());
    }
}
