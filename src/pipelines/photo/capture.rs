// SPDX-License-Identifier: GPL-3.0-only

//! Two-phase still capture
//!
//! A still request first sends an autofocus trigger against the live preview
//! output, waits a fixed settle delay and then issues a single capture against
//! the dedicated still output. The preview keeps running throughout; the
//! session is never reconfigured.
//!
//! ```text
//! Idle ──request──▶ AfTriggered ──settle──▶ CaptureIssued ──image──▶ Completed
//!                        │                        │
//!                        └──── submit error ──────┴──▶ Failed
//! ```
//!
//! Each request gets a [`StillCaptureHandle`] that resolves once. There is a
//! single pending slot: with [`StillRequestPolicy::Replace`] a new request
//! supersedes the outstanding one (whose handle resolves to
//! [`PhotoError::Abandoned`]); with [`StillRequestPolicy::Reject`] it fails
//! with [`PhotoError::CaptureInProgress`]. At most one capture instruction is
//! in flight at any time.

use crate::backends::camera::{CameraDevice, CaptureRequest, EncodedStill, StillReceiver};
use crate::constants::{STILL_CAPTURE_TIMEOUT, STILL_JPEG_QUALITY, STILL_SETTLE_DELAY};
use crate::errors::PhotoError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared, lockable camera device
pub type SharedDevice = Arc<Mutex<Box<dyn CameraDevice>>>;

/// Lock a shared device, recovering from poisoning
pub fn lock_device(device: &SharedDevice) -> MutexGuard<'_, Box<dyn CameraDevice>> {
    device.lock().unwrap_or_else(|e| e.into_inner())
}

/// What happens when a still is requested while another is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillRequestPolicy {
    /// The new request takes over the pending slot
    #[default]
    Replace,
    /// The new request fails with `CaptureInProgress`
    Reject,
}

/// Still capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StillCaptureState {
    Idle,
    AfTriggered,
    CaptureIssued,
    Completed,
    Failed,
}

/// Tunables for the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct StillCaptureSettings {
    /// Delay between autofocus trigger and capture
    pub settle_delay: Duration,
    /// An issued capture whose image has not arrived by then is abandoned
    pub capture_timeout: Duration,
    pub policy: StillRequestPolicy,
    pub jpeg_quality: u8,
}

impl Default for StillCaptureSettings {
    fn default() -> Self {
        Self {
            settle_delay: STILL_SETTLE_DELAY,
            capture_timeout: STILL_CAPTURE_TIMEOUT,
            policy: StillRequestPolicy::Replace,
            jpeg_quality: STILL_JPEG_QUALITY,
        }
    }
}

type StillResult = Result<EncodedStill, PhotoError>;

struct Pending {
    generation: u64,
    responder: oneshot::Sender<StillResult>,
}

#[derive(Clone, Copy)]
struct InFlight {
    id: u64,
    issued_at: Instant,
}

struct Inner {
    state: StillCaptureState,
    pending: Option<Pending>,
    generation: u64,
    /// Capture instruction issued whose image has not arrived yet
    in_flight: Option<InFlight>,
    captures_issued: u64,
}

/// One-shot result of a still request
#[derive(Debug)]
pub struct StillCaptureHandle {
    generation: u64,
    receiver: oneshot::Receiver<StillResult>,
}

impl StillCaptureHandle {
    /// Request number, increasing per orchestrator
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the encoded still
    ///
    /// Resolves to `Abandoned` if the request was superseded or the pipeline
    /// stopped first.
    pub async fn wait(self) -> Result<EncodedStill, PhotoError> {
        self.receiver.await.unwrap_or(Err(PhotoError::Abandoned))
    }
}

/// Drives the autofocus-then-capture sequence against a shared device
pub struct StillCaptureOrchestrator {
    device: SharedDevice,
    inner: Arc<Mutex<Inner>>,
    orientation_tag: u32,
    settings: StillCaptureSettings,
    runtime: Handle,
    completion: Option<JoinHandle<()>>,
}

impl StillCaptureOrchestrator {
    /// Create the orchestrator and start listening on the still output
    ///
    /// `orientation_tag` is the still orientation computed when the session
    /// started. Delayed steps and completion run on `runtime`.
    pub fn new(
        device: SharedDevice,
        still_output: StillReceiver,
        orientation_tag: u32,
        settings: StillCaptureSettings,
        runtime: Handle,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            state: StillCaptureState::Idle,
            pending: None,
            generation: 0,
            in_flight: None,
            captures_issued: 0,
        }));
        let completion = runtime.spawn(deliver_stills(still_output, Arc::clone(&inner)));

        Self {
            device,
            inner,
            orientation_tag,
            settings,
            runtime,
            completion: Some(completion),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    pub fn state(&self) -> StillCaptureState {
        self.lock().state
    }

    /// Whether a request is waiting for its image
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Start a still capture
    ///
    /// Returns once the autofocus trigger has been submitted; the capture
    /// itself is issued after the settle delay.
    pub fn request(&self) -> Result<StillCaptureHandle, PhotoError> {
        let (responder, receiver) = oneshot::channel();

        let generation = {
            let mut inner = self.lock();
            if inner.pending.is_some() && self.settings.policy == StillRequestPolicy::Reject {
                debug!("Rejecting still request, one is already pending");
                return Err(PhotoError::CaptureInProgress);
            }
            inner.generation += 1;
            let generation = inner.generation;
            if let Some(previous) = inner.pending.replace(Pending {
                generation,
                responder,
            }) {
                info!(
                    superseded = previous.generation,
                    generation, "Still request superseded"
                );
            }
            inner.state = StillCaptureState::AfTriggered;
            generation
        };

        let submitted = lock_device(&self.device).capture_once(&CaptureRequest::autofocus_trigger());
        if let Err(e) = submitted {
            error!(error = %e, generation, "Autofocus trigger submission failed");
            let mut inner = self.lock();
            if inner.pending.as_ref().map(|p| p.generation) == Some(generation) {
                inner.pending = None;
                inner.state = StillCaptureState::Failed;
            }
            return Err(PhotoError::CaptureFailed(e.to_string()));
        }

        debug!(generation, "Autofocus triggered");
        self.runtime.spawn(issue_capture_after(
            Arc::clone(&self.device),
            Arc::clone(&self.inner),
            generation,
            CaptureRequest::still(self.orientation_tag, self.settings.jpeg_quality),
            self.settings.settle_delay,
            self.settings.capture_timeout,
        ));

        Ok(StillCaptureHandle {
            generation,
            receiver,
        })
    }

    /// Drop any pending request and stop listening for stills
    pub fn shutdown(&mut self) {
        if let Some(task) = self.completion.take() {
            task.abort();
        }
        let mut inner = self.lock();
        if inner.pending.take().is_some() {
            debug!("Pending still request abandoned on shutdown");
        }
        inner.in_flight = None;
    }
}

impl Drop for StillCaptureOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

async fn issue_capture_after(
    device: SharedDevice,
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    request: CaptureRequest,
    settle_delay: Duration,
    capture_timeout: Duration,
) {
    tokio::time::sleep(settle_delay).await;

    let capture_id = {
        let mut guard = lock_inner(&inner);
        let current = guard.pending.as_ref().map(|p| p.generation);
        if current != Some(generation) {
            debug!(generation, ?current, "Still request no longer pending, skipping capture");
            return;
        }
        if let Some(in_flight) = guard.in_flight {
            if in_flight.issued_at.elapsed() < capture_timeout {
                debug!(generation, "Capture already in flight, its image will serve this request");
                return;
            }
            warn!(
                generation,
                capture = in_flight.id,
                "In-flight capture overdue, issuing a new one"
            );
        }
        guard.captures_issued += 1;
        let id = guard.captures_issued;
        guard.state = StillCaptureState::CaptureIssued;
        guard.in_flight = Some(InFlight {
            id,
            issued_at: Instant::now(),
        });
        id
    };

    let submitted = lock_device(&device).capture_once(&request);
    if let Err(e) = submitted {
        error!(error = %e, generation, "Still capture submission failed");
        let mut guard = lock_inner(&inner);
        guard.in_flight = None;
        guard.state = StillCaptureState::Failed;
        if let Some(pending) = guard.pending.take() {
            let _ = pending
                .responder
                .send(Err(PhotoError::CaptureFailed(e.to_string())));
        }
        return;
    }

    debug!(
        generation,
        capture = capture_id,
        orientation = ?request.jpeg_orientation,
        "Still capture issued"
    );

    tokio::time::sleep(capture_timeout).await;

    let mut guard = lock_inner(&inner);
    if guard.in_flight.map(|f| f.id) != Some(capture_id) {
        return;
    }
    warn!(capture = capture_id, timeout = ?capture_timeout, "Still capture timed out");
    guard.in_flight = None;
    guard.state = StillCaptureState::Failed;
    if let Some(pending) = guard.pending.take() {
        let _ = pending.responder.send(Err(PhotoError::CaptureFailed(
            "No image from the still output".into(),
        )));
    }
}

/// Hand every image from the still output to whichever request is pending
async fn deliver_stills(mut still_output: StillReceiver, inner: Arc<Mutex<Inner>>) {
    while let Some(still) = still_output.recv().await {
        let mut guard = lock_inner(&inner);
        guard.in_flight = None;
        match guard.pending.take() {
            Some(pending) => {
                guard.state = StillCaptureState::Completed;
                info!(
                    generation = pending.generation,
                    width = still.width,
                    height = still.height,
                    size = still.data.len(),
                    "Still capture completed"
                );
                if pending.responder.send(Ok(still)).is_err() {
                    warn!("Still requester went away before completion");
                }
            }
            None => debug!(
                size = still.data.len(),
                "Still arrived with no pending request, dropping"
            ),
        }
    }
    debug!("Still output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{
        BackendError, BackendResult, OutputTarget, Rotation, SessionConfig, SessionOutputs, Size,
        StillSender,
    };

    use std::sync::atomic::{AtomicBool, Ordering};

    /// Device that answers still requests immediately unless told otherwise
    struct ScriptedDevice {
        requests: Arc<Mutex<Vec<CaptureRequest>>>,
        still: StillSender,
        fail_stills: bool,
        fail_autofocus: Arc<AtomicBool>,
        hold_stills: Arc<AtomicBool>,
    }

    impl CameraDevice for ScriptedDevice {
        fn sensor_orientation(&self) -> Rotation {
            Rotation::Rotate90
        }

        fn preview_sizes(&self) -> Vec<Size> {
            Vec::new()
        }

        fn still_sizes(&self) -> Vec<Size> {
            Vec::new()
        }

        fn open(&mut self, _: &SessionConfig, _: SessionOutputs) -> BackendResult<()> {
            Ok(())
        }

        fn set_repeating_capture(&mut self, _: &CaptureRequest) -> BackendResult<()> {
            Ok(())
        }

        fn capture_once(&mut self, request: &CaptureRequest) -> BackendResult<()> {
            if request.target == OutputTarget::Still && self.fail_stills {
                return Err(BackendError::SubmissionFailed("still output".into()));
            }
            if request.af_trigger && self.fail_autofocus.load(Ordering::SeqCst) {
                return Err(BackendError::SubmissionFailed("preview output".into()));
            }
            self.requests.lock().unwrap().push(request.clone());
            if request.target == OutputTarget::Still && !self.hold_stills.load(Ordering::SeqCst) {
                let _ = self.still.send(EncodedStill {
                    data: vec![0xFF, 0xD8, 0xFF, 0xD9],
                    width: 4,
                    height: 4,
                    orientation: request.jpeg_orientation.unwrap_or(0),
                });
            }
            Ok(())
        }

        fn close(&mut self) {}
    }

    struct Fixture {
        orchestrator: StillCaptureOrchestrator,
        requests: Arc<Mutex<Vec<CaptureRequest>>>,
        still: StillSender,
        fail_autofocus: Arc<AtomicBool>,
        hold_stills: Arc<AtomicBool>,
    }

    fn fixture(policy: StillRequestPolicy, fail_stills: bool, hold_stills: bool) -> Fixture {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let fail_autofocus = Arc::new(AtomicBool::new(false));
        let hold_stills = Arc::new(AtomicBool::new(hold_stills));
        let device: Box<dyn CameraDevice> = Box::new(ScriptedDevice {
            requests: Arc::clone(&requests),
            still: tx.clone(),
            fail_stills,
            fail_autofocus: Arc::clone(&fail_autofocus),
            hold_stills: Arc::clone(&hold_stills),
        });
        let settings = StillCaptureSettings {
            settle_delay: Duration::from_millis(30),
            capture_timeout: Duration::from_millis(300),
            policy,
            jpeg_quality: STILL_JPEG_QUALITY,
        };
        Fixture {
            orchestrator: StillCaptureOrchestrator::new(
                Arc::new(Mutex::new(device)),
                rx,
                180,
                settings,
                Handle::current(),
            ),
            requests,
            still: tx,
            fail_autofocus,
            hold_stills,
        }
    }

    fn still_count(requests: &Mutex<Vec<CaptureRequest>>) -> usize {
        requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target == OutputTarget::Still)
            .count()
    }

    #[tokio::test]
    async fn test_af_then_capture_completes() {
        let f = fixture(StillRequestPolicy::Replace, false, false);
        let handle = f.orchestrator.request().unwrap();
        assert_eq!(f.orchestrator.state(), StillCaptureState::AfTriggered);

        let still = handle.wait().await.unwrap();
        assert_eq!(still.orientation, 180);
        assert_eq!(f.orchestrator.state(), StillCaptureState::Completed);
        assert!(!f.orchestrator.has_pending());

        let requests = f.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].af_trigger);
        assert_eq!(requests[0].target, OutputTarget::Preview);
        assert_eq!(requests[1], CaptureRequest::still(180, 100));
    }

    #[tokio::test]
    async fn test_second_request_supersedes_first() {
        let f = fixture(StillRequestPolicy::Replace, false, false);
        let first = f.orchestrator.request().unwrap();
        let second = f.orchestrator.request().unwrap();

        assert!(second.wait().await.is_ok());
        assert_eq!(first.wait().await.unwrap_err(), PhotoError::Abandoned);

        // The superseded request's delayed step must not issue a capture
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(still_count(&f.requests), 1);
    }

    #[tokio::test]
    async fn test_reject_policy() {
        let f = fixture(StillRequestPolicy::Reject, false, true);
        let _first = f.orchestrator.request().unwrap();
        assert_eq!(
            f.orchestrator.request().unwrap_err(),
            PhotoError::CaptureInProgress
        );
    }

    #[tokio::test]
    async fn test_submission_failure_yields_no_image() {
        let f = fixture(StillRequestPolicy::Replace, true, false);
        let handle = f.orchestrator.request().unwrap();

        assert!(matches!(
            handle.wait().await,
            Err(PhotoError::CaptureFailed(_))
        ));
        assert_eq!(f.orchestrator.state(), StillCaptureState::Failed);
        assert!(!f.orchestrator.has_pending());
    }

    #[tokio::test]
    async fn test_only_one_capture_in_flight() {
        let f = fixture(StillRequestPolicy::Replace, false, true);
        let _first = f.orchestrator.request().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(f.orchestrator.state(), StillCaptureState::CaptureIssued);

        // Capture for the first request is outstanding; the second must reuse it
        let second = f.orchestrator.request().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(still_count(&f.requests), 1);

        f.still
            .send(EncodedStill {
                data: vec![1, 2, 3],
                width: 1,
                height: 1,
                orientation: 180,
            })
            .unwrap();
        assert_eq!(second.wait().await.unwrap().data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_autofocus_failure_fails_request() {
        let f = fixture(StillRequestPolicy::Replace, false, false);
        f.fail_autofocus.store(true, Ordering::SeqCst);

        assert!(matches!(
            f.orchestrator.request(),
            Err(PhotoError::CaptureFailed(_))
        ));
        assert_eq!(f.orchestrator.state(), StillCaptureState::Failed);
        assert!(!f.orchestrator.has_pending());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(still_count(&f.requests), 0);

        f.fail_autofocus.store(false, Ordering::SeqCst);
        assert!(f.orchestrator.request().unwrap().wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_lost_capture_times_out() {
        let f = fixture(StillRequestPolicy::Replace, false, true);
        let handle = f.orchestrator.request().unwrap();

        assert!(matches!(
            handle.wait().await,
            Err(PhotoError::CaptureFailed(_))
        ));
        assert_eq!(f.orchestrator.state(), StillCaptureState::Failed);
        assert!(!f.orchestrator.has_pending());

        // The device delivers again; a new request gets its own capture
        f.hold_stills.store(false, Ordering::SeqCst);
        assert!(f.orchestrator.request().unwrap().wait().await.is_ok());
        assert_eq!(still_count(&f.requests), 2);
    }

    #[tokio::test]
    async fn test_requests_recover_after_lost_capture() {
        let f = fixture(StillRequestPolicy::Replace, false, true);
        let first = f.orchestrator.request().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.hold_stills.store(false, Ordering::SeqCst);

        // Waits on the lost capture, so it fails once that times out
        let second = f.orchestrator.request().unwrap();
        assert_eq!(first.wait().await.unwrap_err(), PhotoError::Abandoned);
        let second = tokio::time::timeout(Duration::from_secs(2), second.wait())
            .await
            .expect("second request never resolved");
        assert!(matches!(second, Err(PhotoError::CaptureFailed(_))));

        let third = f.orchestrator.request().unwrap();
        let third = tokio::time::timeout(Duration::from_secs(2), third.wait())
            .await
            .expect("third request never resolved");
        assert!(third.is_ok());
        assert_eq!(still_count(&f.requests), 2);
    }

    #[tokio::test]
    async fn test_unsolicited_still_is_dropped() {
        let f = fixture(StillRequestPolicy::Replace, false, false);
        f.still
            .send(EncodedStill {
                data: vec![9],
                width: 1,
                height: 1,
                orientation: 0,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.orchestrator.state(), StillCaptureState::Idle);

        let handle = f.orchestrator.request().unwrap();
        assert_ne!(handle.wait().await.unwrap().data, vec![9]);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending() {
        let mut f = fixture(StillRequestPolicy::Replace, false, true);
        let handle = f.orchestrator.request().unwrap();
        f.orchestrator.shutdown();
        assert_eq!(handle.wait().await.unwrap_err(), PhotoError::Abandoned);
    }
}
