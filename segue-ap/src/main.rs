//! Segue Audio Player (segue-ap) - command-line entry point
//!
//! Plays the given files back to back without gaps and accepts simple line
//! commands on stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use segue_ap::audio::{AudioOutput, FileTrackSource, Mixer, SymphoniaDecoder};
use segue_ap::config::{HeadStrategy, PlayerConfig};
use segue_ap::PlaybackEngine;
use segue_common::config::CONFIG_ENV_VAR;
use segue_common::events::SegueEvent;
use segue_common::human_time::format_position_ms;
use segue_common::TrackRef;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for segue-ap
#[derive(Parser, Debug)]
#[command(name = "segue-ap")]
#[command(about = "Gapless audio player")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Initial volume (0.0-1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Output device name
    #[arg(short, long, env = "SEGUE_AUDIO_DEVICE")]
    device: Option<String>,

    /// Fully decode the first track too (gap-accurate, slower to start)
    #[arg(long)]
    precise_head: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Files to play, in order
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if let Some(device) = args.device.clone() {
        config.audio_device = Some(device);
    }
    if args.precise_head {
        config.head_strategy = HeadStrategy::Precise;
    }
    let config = config.validated();

    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("segue_ap={level},segue_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        for device in AudioOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", device);
        }
        return Ok(());
    }

    if args.files.is_empty() {
        anyhow::bail!("No files given");
    }

    info!("Starting Segue Audio Player ({} tracks)", args.files.len());

    let mut output = AudioOutput::open(config.audio_device.as_deref()).context("Failed to open audio output")?;
    let mixer = Mixer::new(output.sample_rate(), output.channels(), config.fft_size);
    output.start(mixer.clone()).context("Failed to start audio output")?;

    let engine = PlaybackEngine::new(
        config.clone(),
        mixer,
        Arc::new(FileTrackSource::new(config.root_folder.clone())),
        Arc::new(SymphoniaDecoder::new()),
    );

    let tracks: Vec<TrackRef> = args
        .files
        .iter()
        .map(|path| TrackRef::new(path.to_string_lossy()))
        .collect();
    engine.set_queue(tracks.clone()).await?;

    let reporter = tokio::spawn(report_events(engine.clone()));

    if let Err(e) = engine.start(tracks[0].clone(), 0.0).await {
        error!("Failed to start {}: {}", tracks[0], e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !handle_command(&engine, line.trim()).await {
                            break;
                        }
                    }
                    None => {
                        // stdin closed: keep playing until interrupted
                        (&mut shutdown).await;
                        break;
                    }
                }
            }
        }
    }

    engine.shutdown().await;
    reporter.abort();
    output.stop();
    if output.has_error() {
        warn!("Audio output reported {} errors", output.error_count());
    }
    info!("Shutdown complete");
    Ok(())
}

/// Apply one stdin command; returns false on quit
async fn handle_command(engine: &PlaybackEngine, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let result = match (parts.next(), parts.next()) {
        (None, _) => Ok(()),
        (Some("q"), _) => return false,
        (Some("p"), _) => engine.pause().await,
        (Some("r"), _) => engine.resume().await,
        (Some("n"), _) => engine.next().await,
        (Some("b"), _) => engine.previous().await,
        (Some("s"), Some(ms)) => match ms.parse::<u64>() {
            Ok(ms) => engine.seek(ms).await,
            Err(_) => {
                warn!("Invalid seek position: {}", ms);
                Ok(())
            }
        },
        (Some("v"), Some(v)) => match v.parse::<f32>() {
            Ok(v) => engine.set_volume(v).await,
            Err(_) => {
                warn!("Invalid volume: {}", v);
                Ok(())
            }
        },
        (Some(other), _) => {
            warn!("Unknown command '{}' (p r n b s <ms> v <0..1> q)", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        error!("Command '{}' failed: {}", line, e);
    }
    true
}

/// Log track changes and progress until aborted
async fn report_events(engine: PlaybackEngine) {
    let mut events = Box::pin(engine.publisher().event_stream());
    let mut progress = Box::pin(engine.publisher().progress_stream());
    let mut last_second = u64::MAX;

    loop {
        tokio::select! {
            Some(event) = events.next() => match event {
                SegueEvent::TrackStarted { track, kind, duration_ms, .. } => {
                    info!("▶ {} [{}] ({})", track, format_position_ms(duration_ms), kind)
                }
                SegueEvent::TrackLoadFailed { track, error, .. } => warn!("Could not load {}: {}", track, error),
                SegueEvent::PlaybackStateChanged { new_state, .. } => info!("State: {}", new_state),
                _ => {}
            },
            Some(position_ms) = progress.next() => {
                let second = position_ms / 1000;
                if second != last_second && position_ms > 0 {
                    last_second = second;
                    info!(
                        "{} / {}",
                        format_position_ms(position_ms),
                        format_position_ms(engine.publisher().duration_ms())
                    );
                }
            }
            else => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
