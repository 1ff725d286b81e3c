//! Seamless Shift player - command shell entry point
//!
//! Opens the audio device, adds any files given on the command line and
//! then reads commands from stdin until `quit`, end of input, Ctrl+C or
//! SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use seamless_common::config::EngineConfig;
use seamless_player::audio::AudioOutput;
use seamless_player::shell::{format_device_list, Reply, Shell, SnapshotCache, HELP};
use seamless_player::Engine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for seamless-player
#[derive(Parser, Debug)]
#[command(name = "seamless-player")]
#[command(about = "Multi-track ambient mixer with fades, loops and focus")]
#[command(version)]
struct Args {
    /// Audio files to add at startup
    files: Vec<PathBuf>,

    /// Configuration file (overrides SEAMLESS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output device name (default device if omitted)
    #[arg(short, long, env = "SEAMLESS_DEVICE")]
    device: Option<String>,

    /// Default fade length in seconds for fade and focus commands
    #[arg(long)]
    fade_secs: Option<f64>,

    /// Print the track list as JSON
    #[arg(long)]
    json: bool,

    /// Start playing every track added at startup
    #[arg(long)]
    autoplay: bool,

    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        let devices = AudioOutput::list_devices().context("Failed to enumerate output devices")?;
        println!("{}", format_device_list(&devices, None));
        return Ok(());
    }

    let mut config = EngineConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("seamless_player={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(device) = args.device.clone() {
        config.audio.device = Some(device);
    }
    if let Some(secs) = args.fade_secs {
        config.timing.default_fade_secs = secs;
    }
    let fade_secs = config.timing.default_fade_secs;

    info!("Starting Seamless Shift player");

    let engine = Engine::start(config).context("Failed to start audio engine")?;
    if let Some(device) = engine.output_device() {
        info!("Playing through '{}'", device);
    }

    let cache = SnapshotCache::default();
    let refresher = cache.spawn_refresher(engine.clone());

    for file in &args.files {
        let id = engine
            .add_track(file, None)
            .await
            .context("Failed to add startup track")?;
        if args.autoplay {
            engine.play(id);
        }
    }
    cache.refresh(&engine).await;

    let shell = Shell::new(engine.clone(), cache, fade_secs, args.json);
    println!("{}", HELP);

    tokio::select! {
        _ = run_shell(&shell) => {
            info!("Input closed, shutting down");
        },
        _ = shutdown_signal() => {},
    }

    engine.shutdown();
    refresher.abort();
    info!("Shutdown complete");
    Ok(())
}

/// Read and execute stdin commands until `quit` or end of input.
async fn run_shell(shell: &Shell) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };

        match shell.handle_line(&line).await {
            Ok(Reply::Done) => {}
            Ok(Reply::Text(text)) => println!("{}", text),
            Ok(Reply::Quit) => break,
            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
