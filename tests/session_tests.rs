// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the viewer session lifecycle

use edge_camera::backends::camera::{
    BackendError, CameraDevice, FixedDisplayRotation, Rotation, Size,
};
use edge_camera::backends::virtual_camera::{VirtualCamera, VirtualCameraOptions};
use edge_camera::errors::PhotoError;
use edge_camera::relay::{RelayError, RelayMessage, RelaySink};
use edge_camera::{AppError, Config, ProcessingMode, ViewerSession};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    fn formats(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| serde_json::from_str::<RelayMessage>(m).unwrap().format)
            .collect()
    }
}

impl RelaySink for CollectingSink {
    fn send_text(&self, text: String) -> Result<(), RelayError> {
        self.messages.lock().unwrap().push(text);
        Ok(())
    }
}

fn output_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("edge-camera-session-{}-{}", name, std::process::id()))
}

fn session(config: Config, deny_permission: Arc<AtomicBool>) -> ViewerSession {
    ViewerSession::new(
        config,
        Handle::current(),
        Box::new(move || {
            let camera = VirtualCamera::new(VirtualCameraOptions {
                preview_sizes: vec![Size::new(64, 48)],
                still_sizes: vec![Size::new(120, 90)],
                ..Default::default()
            });
            camera
                .probe()
                .set_deny_permission(deny_permission.load(Ordering::SeqCst));
            Box::new(camera) as Box<dyn CameraDevice>
        }),
        Arc::new(FixedDisplayRotation(Rotation::None)),
    )
}

fn config(mode: ProcessingMode, dir: &Path) -> Config {
    Config {
        processing_mode: mode,
        output_dir: Some(dir.to_path_buf()),
        still_settle_ms: 20,
        ..Config::default()
    }
}

async fn wait_for_processed_frame(session: &ViewerSession) {
    let display = session.pipeline().unwrap().display();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !display
        .borrow()
        .as_ref()
        .is_some_and(|f| f.mode == session.mode())
    {
        assert!(Instant::now() < deadline, "no frame displayed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_save_processed_frame() {
    let dir = output_dir("processed");
    let sink = Arc::new(CollectingSink::default());
    let mut session = session(
        config(ProcessingMode::Canny, &dir),
        Arc::new(AtomicBool::new(false)),
    )
    .with_relay_sink(sink.clone());

    session.resume().await.unwrap();
    wait_for_processed_frame(&session).await;

    let path = session.save_current_frame().await.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("processed_") && name.ends_with(".png"));
    assert!(path.starts_with(&dir));
    assert!(sink.formats().contains(&"CANNY".to_string()));

    session.pause().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_save_in_raw_mode_captures_still() {
    let dir = output_dir("raw");
    let sink = Arc::new(CollectingSink::default());
    let mut session = session(
        config(ProcessingMode::Raw, &dir),
        Arc::new(AtomicBool::new(false)),
    )
    .with_relay_sink(sink.clone());

    session.resume().await.unwrap();
    let path = session.save_current_frame().await.unwrap();
    assert_eq!(path.extension().unwrap(), "jpg");

    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (120, 90));
    // RAW frames are never streamed, so the only message is the still
    assert_eq!(sink.formats(), vec!["JPEG".to_string()]);

    session.pause().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_toggle_mode_cycles() {
    let dir = output_dir("toggle");
    let session = session(
        config(ProcessingMode::Raw, &dir),
        Arc::new(AtomicBool::new(false)),
    );
    assert_eq!(session.toggle_mode(), ProcessingMode::Grayscale);
    assert_eq!(session.toggle_mode(), ProcessingMode::Canny);
    assert_eq!(session.toggle_mode(), ProcessingMode::Raw);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_and_resume() {
    let dir = output_dir("lifecycle");
    let mut session = session(
        config(ProcessingMode::Grayscale, &dir),
        Arc::new(AtomicBool::new(false)),
    );

    session.resume().await.unwrap();
    assert!(session.is_running());
    session.pause().await;
    assert!(!session.is_running());
    assert!(matches!(
        session.save_current_frame().await,
        Err(AppError::Photo(PhotoError::NoCameraSession))
    ));

    session.resume().await.unwrap();
    wait_for_processed_frame(&session).await;
    session.pause().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_relay_does_not_block_camera() {
    let dir = output_dir("norelay");
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config(ProcessingMode::Canny, &dir);
    config.relay_url = Some(format!("ws://{}/frames", addr));
    let mut session = session(config, Arc::new(AtomicBool::new(false)));

    session.resume().await.unwrap();
    assert!(session.is_running());
    assert!(!session.is_relay_connected());
    session.pause().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_permission_denied_is_reported() {
    let dir = output_dir("denied");
    let mut session = session(
        config(ProcessingMode::Canny, &dir),
        Arc::new(AtomicBool::new(true)),
    );

    let result = session.resume().await;
    assert!(matches!(
        result,
        Err(AppError::Camera(BackendError::PermissionDenied(_)))
    ));
    assert!(!session.is_running());
}
