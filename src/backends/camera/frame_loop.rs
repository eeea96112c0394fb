// SPDX-License-Identifier: GPL-3.0-only

//! Dedicated background context for frame delivery
//!
//! Conversion, rotation and dispatch of preview frames all run on one named
//! worker thread owned by the pipeline. The thread starts when the worker is
//! created and is stopped and joined when it is stopped or dropped, so no
//! frame work outlives the pipeline that spawned it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop
    Stop,
}

/// Owned worker thread running a frame loop
///
/// ```ignore
/// let worker = FrameWorker::start("frame-worker", move || {
///     match mailbox.take_timeout(FRAME_POLL_INTERVAL) {
///         Some(frame) => dispatcher.handle(frame),
///         None => {}
///     }
///     LoopAction::Continue
/// })?;
/// worker.stop();
/// ```
pub struct FrameWorker {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameWorker {
    /// Spawn the worker; `loop_fn` runs until it returns `Stop` or `stop()` is called
    ///
    /// Iterations should block for a bounded time only, since the stop signal
    /// is checked between iterations.
    pub fn start<F>(name: &str, mut loop_fn: F) -> std::io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting frame worker");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %thread_name, "Worker loop requested stop");
                        break;
                    }
                }
                info!(name = %thread_name, "Frame worker exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop and join the thread
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the thread to finish
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "Frame worker panicked");
            } else {
                debug!(name = %self.name, "Frame worker joined");
            }
        }
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut worker = FrameWorker::start("test-worker", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        worker.join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_stop_joins_thread() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut worker = FrameWorker::start("test-worker", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        worker.stop();
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }
}
