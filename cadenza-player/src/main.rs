//! cadenza-play - command-line player
//!
//! Plays files sequentially through the playback engine, driving `update()` from a
//! tokio interval the way a host application's frame tick would.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cadenza_common::config::{BackendKind, TomlConfig};
use cadenza_player::{AfterFadeAction, AudioEffect, PlaybackEngine, PlayerConfig, StreamHandle};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICK: Duration = Duration::from_millis(20);

/// Command-line arguments for cadenza-play
#[derive(Parser, Debug)]
#[command(name = "cadenza-play")]
#[command(about = "Stream audio files through the Cadenza playback engine")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CADENZA_CONFIG")]
    config: Option<PathBuf>,

    /// Output backend: cpal or memory
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Loop each file until interrupted
    #[arg(short = 'l', long = "loop")]
    looping: bool,

    /// Pre-buffer before starting playback
    #[arg(long)]
    prescan: bool,

    /// Global volume in percent
    #[arg(short, long)]
    volume: Option<f32>,

    /// Start position in seconds
    #[arg(short, long)]
    seek: Option<f64>,

    /// Fade in over this many seconds
    #[arg(long)]
    fade_in: Option<f64>,

    /// Fade out over the last this many seconds
    #[arg(long)]
    fade_out: Option<f64>,

    /// Print playback events as JSON lines
    #[arg(long)]
    json: bool,

    /// Files to play
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut toml = TomlConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(backend) = args.backend {
        toml.output.backend = backend;
    }
    if let Some(volume) = args.volume {
        toml.playback.global_volume_percent = volume;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&toml.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PlayerConfig::try_from_toml(&toml).context("Invalid configuration")?;
    info!("Starting cadenza-play (backend={})", config.backend);

    let engine = Arc::new(PlaybackEngine::from_config(config));
    engine.init();

    if args.json {
        let mut events = engine.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize event: {}", e),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event printer lagged, {} events dropped", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                // Keep the sender alive so playback is not treated as interrupted
                std::future::pending::<()>().await;
            }
        }
    });

    for file in &args.files {
        if *shutdown_rx.borrow() {
            break;
        }
        play_file(&engine, file, &args, &mut shutdown_rx).await;
    }

    let closing = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || closing.close())
        .await
        .context("Engine shutdown failed")?;

    info!("Shutdown complete");
    Ok(())
}

fn default_filter(level: &str) -> String {
    format!("cadenza_player={level},cadenza_common={level},cadenza_play={level}")
}

async fn play_file(
    engine: &PlaybackEngine,
    file: &Path,
    args: &Args,
    shutdown: &mut watch::Receiver<bool>,
) {
    let medium = file.to_string_lossy();
    let handle = engine.load(&medium, args.looping, args.prescan, AudioEffect::None);
    if handle == StreamHandle::INVALID {
        eprintln!("Cannot play {}", file.display());
        return;
    }

    let length = engine.length(handle).unwrap_or(0.0);
    if !args.json {
        println!("Playing {} ({:.2}s)", file.display(), length);
    }

    if let Some(seconds) = args.seek {
        engine.set_position(handle, seconds);
    }

    match args.fade_in {
        Some(seconds) => {
            engine.set_volume(handle, 0.0);
            engine.play(handle);
            engine.fade(handle, 100.0, seconds, AfterFadeAction::None);
        }
        None => engine.play(handle),
    }

    let mut interval = tokio::time::interval(TICK);
    let mut fading_out = false;
    let mut last_report = -1i64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                engine.close_stream(handle);
                return;
            }
        }

        engine.update();

        if engine.is_finished(handle) {
            break;
        }

        let position = engine.position(handle).unwrap_or(0.0);

        if let Some(seconds) = args.fade_out {
            if !args.looping && !fading_out && length > 0.0 && position >= length - seconds {
                engine.fade(handle, 0.0, (length - position).max(0.0), AfterFadeAction::Close);
                fading_out = true;
            }
        }

        if !args.json && position as i64 != last_report {
            last_report = position as i64;
            println!("{:>8.2} / {:.2}s", position, length);
        }
    }

    engine.close_stream(handle);
}
