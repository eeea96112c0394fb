// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use edge_camera::ProcessingMode;
use edge_camera::backends::camera::Size;
use edge_camera::constants::RELAY_HUB_DEFAULT_ADDR;

mod cli;

#[derive(Parser)]
#[command(name = "edge-camera")]
#[command(about = "Camera preview with on-device processing and a WebSocket frame relay")]
#[command(version = env!("BUILD_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a viewer session against the virtual camera
    Run {
        /// Stop after this many seconds (runs until Ctrl+C otherwise)
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Relay endpoint, e.g. ws://127.0.0.1:8080/frames (overrides config)
        #[arg(short, long)]
        relay: Option<String>,

        /// Processing mode: raw, grayscale or canny (overrides config)
        #[arg(short, long)]
        mode: Option<ProcessingMode>,

        /// Save the current frame before exiting
        #[arg(long)]
        snapshot: bool,
    },

    /// Run the relay hub that rebroadcasts frames to all viewers
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = RELAY_HUB_DEFAULT_ADDR)]
        addr: String,
    },

    /// Show which preview size would be chosen from a list of sizes
    Sizes {
        /// Candidate sizes as WIDTHxHEIGHT
        sizes: Vec<Size>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=edge_camera=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            seconds,
            relay,
            mode,
            snapshot,
        } => cli::run_session(cli::RunArgs {
            seconds,
            relay,
            mode,
            snapshot,
        }),
        Commands::Serve { addr } => cli::serve(&addr),
        Commands::Sizes { sizes } => cli::show_sizes(&sizes),
    }
}
