// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - `run`: a viewer session against the virtual camera, with live stats
//! - `serve`: the relay hub
//! - `sizes`: preview size selection for a list of candidates

use edge_camera::backends::camera::{
    CameraDevice, FixedDisplayRotation, Rotation, Size, select_optimal_size,
};
use edge_camera::backends::virtual_camera::{VirtualCamera, VirtualCameraOptions};
use edge_camera::constants::RELAY_HUB_PATH;
use edge_camera::relay::RelayHub;
use edge_camera::{Config, ProcessingMode, ViewerSession};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Options for `run`
pub struct RunArgs {
    pub seconds: Option<u64>,
    pub relay: Option<String>,
    pub mode: Option<ProcessingMode>,
    pub snapshot: bool,
}

/// How often the status line is refreshed
const STATUS_INTERVAL: Duration = Duration::from_millis(250);

/// Flag set by Ctrl+C
fn install_stop_flag() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;
    Ok(stop_flag)
}

/// Run a viewer session until the duration elapses or Ctrl+C
pub fn run_session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    if let Some(url) = args.relay {
        config.relay_url = Some(url);
    }
    if let Some(mode) = args.mode {
        config.processing_mode = mode;
    }

    let stop_flag = install_stop_flag()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let mut session = ViewerSession::new(
            config,
            tokio::runtime::Handle::current(),
            Box::new(|| {
                Box::new(VirtualCamera::new(VirtualCameraOptions::default())) as Box<dyn CameraDevice>
            }),
            Arc::new(FixedDisplayRotation(Rotation::None)),
        );

        session.resume().await?;
        if let Some(url) = &session.config().relay_url {
            let state = if session.is_relay_connected() {
                "connected"
            } else {
                "unavailable"
            };
            println!("Relay {}: {}", url, state);
        }
        if let Some(pipeline) = session.pipeline() {
            let sizes = pipeline.session_config();
            println!(
                "Preview {} (rotated {}°), stills {}",
                sizes.preview_size,
                pipeline.orientation().relative.degrees(),
                sizes.still_size
            );
        }
        println!("Running... (press Ctrl+C to stop)");

        let mut reader = session
            .display()
            .ok_or("Session started without a preview pipeline")?;
        let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
        let mut frames = 0u64;
        let mut last_status = Instant::now();

        loop {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping early...");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                println!();
                break;
            }

            if let Ok(Some(frame)) =
                tokio::time::timeout(STATUS_INTERVAL, reader.next_frame()).await
            {
                frames += 1;
                if last_status.elapsed() >= STATUS_INTERVAL {
                    let (width, height) = frame.image.dimensions();
                    print!(
                        "\r{} {}x{}  frames: {}  fps: {:.1}  ",
                        frame.mode,
                        width,
                        height,
                        frames,
                        reader.fps()
                    );
                    std::io::Write::flush(&mut std::io::stdout())?;
                    last_status = Instant::now();
                }
            }
        }

        if args.snapshot {
            match session.save_current_frame().await {
                Ok(path) => println!("Snapshot saved: {}", path.display()),
                Err(e) => eprintln!("Snapshot failed: {}", e),
            }
        }

        if let Some(pipeline) = session.pipeline() {
            let stats = pipeline.stats();
            println!(
                "Displayed {} frames, relayed {}, skipped by renderer {}",
                stats.displayed(),
                stats.relayed(),
                reader.skipped()
            );
        }
        session.pause().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Run the relay hub until Ctrl+C
pub fn serve(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stop_flag = install_stop_flag()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let hub = RelayHub::bind(addr).await?;
        println!("Relay hub on ws://{}{}", hub.local_addr(), RELAY_HUB_PATH);
        println!("Press Ctrl+C to stop");

        let mut clients = 0;
        while !stop_flag.load(Ordering::SeqCst) {
            let count = hub.client_count().await;
            if count != clients {
                println!("Clients connected: {}", count);
                clients = count;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        println!("Stopping relay hub");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Print the preview size chosen from `sizes`
pub fn show_sizes(sizes: &[Size]) -> Result<(), Box<dyn std::error::Error>> {
    if sizes.is_empty() {
        println!("No sizes given, default applies");
    }
    let chosen = select_optimal_size(sizes);
    println!("Preview size: {}", chosen);
    Ok(())
}
