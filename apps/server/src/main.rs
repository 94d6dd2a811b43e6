//! Slimsonos Server - headless LMS to Sonos streaming bridge.
//!
//! Wires the core pipeline together: the shared output buffer the LMS
//! player client feeds, the pull loop that detects silence edges and hands
//! PCM to the active session, the HTTP server the Sonos device pulls FLAC
//! from, and the control loop that points the device at each new stream.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use slimsonos_core::{
    spawn_control_loop, spawn_pull_loop, start_server, AppState, LocalIpDetector, LoggingPlayback,
    NetworkContext, OutputStage, PlaybackGauge, SharedOutputBuffer, SonosPlayback, StreamIdSource,
    StreamSlot, DEFAULT_ICON,
};
use tokio::signal;

use crate::config::ServerConfig;

/// Slimsonos Server - bridges an LMS player to a Sonos device over HTTP FLAC.
#[derive(Parser, Debug)]
#[command(name = "slimsonos-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SLIMSONOS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// LMS server host (overrides config file).
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Sonos room name to drive (overrides config file).
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Sonos device IP, bypassing room discovery (overrides config file).
    #[arg(short = 'i', long)]
    ip: Option<std::net::IpAddr>,

    /// Play this single file instead of bridging the LMS pipeline.
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SLIMSONOS_BIND_PORT")]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long, env = "SLIMSONOS_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Slimsonos Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(server) = args.server {
        config.lms_server = Some(server);
    }
    if let Some(room) = args.room {
        config.room = room;
    }
    if let Some(ip) = args.ip {
        config.device_ip = Some(ip);
    }
    if let Some(file) = args.file {
        config.playback_file = Some(file);
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }

    let core_config = config.to_core_config();
    core_config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    // Resolve advertise IP: use explicit config, or fall back to auto-detection
    let network = if let Some(ip) = config.advertise_ip {
        log::info!(
            "Configuration: bind_port={}, advertise_ip={}",
            config.bind_port,
            ip
        );
        NetworkContext::explicit(config.bind_port, ip)
    } else {
        log::info!(
            "Configuration: bind_port={}, advertise_ip=auto",
            config.bind_port
        );
        let detector = LocalIpDetector::arc();
        NetworkContext::auto_detect(config.bind_port, detector).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set SLIMSONOS_ADVERTISE_IP to the IP \
             address the Sonos device can reach.",
        )?
    };

    let ids = Arc::new(StreamIdSource::new());
    let slot = Arc::new(StreamSlot::new());
    let gauge = Arc::new(PlaybackGauge::new());

    // The LMS player client is an external collaborator; it appends post-mix
    // frames and silence markers to this buffer.
    let output = Arc::new(SharedOutputBuffer::new());
    if let Some(ref server) = config.lms_server {
        log::info!("LMS server: {} (room \"{}\")", server, config.room);
    }

    // Single-file mode plays a track URL directly and has no LMS pipeline to
    // pull from.
    let pull = if config.playback_file.is_none() {
        Some(
            spawn_pull_loop(
                Arc::clone(&output) as Arc<dyn OutputStage>,
                Arc::clone(&ids),
                Arc::clone(&slot),
            )
            .context("Failed to start the PCM pull loop")?,
        )
    } else {
        None
    };

    let playback: Arc<dyn SonosPlayback> = Arc::new(LoggingPlayback);
    let control = spawn_control_loop(Arc::clone(&playback), Arc::clone(&ids), network.clone());

    let state = AppState {
        slot: Arc::clone(&slot),
        ids: Arc::clone(&ids),
        gauge,
        network: network.clone(),
        sample_bits: config.sample_bits,
        playback_file: config.playback_file.clone(),
        icon: Some(DEFAULT_ICON),
    };

    let bind_port = config.bind_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(state, bind_port).await {
            log::error!("Server error: {}", e);
        }
    });

    // Single-file mode: once the server is reachable, just tell the device
    // to play the track URL.
    if let Some(file) = config.playback_file {
        while network.get_port() == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let builder = network.url_builder();
        let title = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Slimsonos".to_string());
        playback
            .play_uri(&builder.track_url(), &title, &builder.icon_url())
            .await
            .context("Failed to start single-file playback")?;
    }

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    control.stop();
    if let Some(session) = slot.current() {
        session.close();
    }
    // The pull loop thread joins off the async runtime.
    if let Some(pull) = pull {
        let _ = tokio::task::spawn_blocking(move || pull.stop()).await;
    }
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for the first termination signal; a second one forces exit.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};
        let mut int = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
        let mut term = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("Failed to install SIGQUIT handler");
        let mut hup = signal(SignalKind::hangup()).expect("Failed to install SIGHUP handler");

        tokio::select! {
            _ = int.recv() => {},
            _ = term.recv() => {},
            _ = quit.recv() => {},
            _ = hup.recv() => {},
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = int.recv() => {},
                _ = term.recv() => {},
                _ = quit.recv() => {},
                _ = hup.recv() => {},
            }
            log::warn!("Second signal received, terminating immediately");
            std::process::exit(1);
        });
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
