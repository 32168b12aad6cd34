//! # CoDrone Link
//!
//! Connect to a CoDrone/Petrone drone through its link dongle and report
//! flight events and telemetry until interrupted.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use codrone_link::config::Config;
use codrone_link::link::{Event, Link};
use codrone_link::telemetry::TelemetryRecorder;

/// Config file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Period of the status report
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Load the config from `path`, the default file, or built-in defaults
fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading config from {}", path);
            Ok(Config::load(path)?)
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("Loading config from {}", DEFAULT_CONFIG_PATH);
            Ok(Config::load(DEFAULT_CONFIG_PATH)?)
        }
        None => {
            info!("No config file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Main entry point
///
/// # Control Flow
///
/// 1. Load config and open the serial port
/// 2. Register a logging callback for every flight event
/// 3. Optionally record every decoded packet to JSONL
/// 4. Discover and connect to the drone
/// 5. Report state and battery once per second until Ctrl+C
///
/// # Examples
///
/// ```bash
/// RUST_LOG=codrone_link=debug cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("CoDrone Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref())?;

    let mut link = Link::open(&config)?;

    for event in Event::ALL {
        link.on_event(event, move || info!("Event: {:?}", event));
    }

    if config.telemetry.enabled {
        let recorder = Mutex::new(TelemetryRecorder::new(&config.telemetry)?);
        link.set_packet_tap(move |packet, count| {
            let mut recorder = recorder.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = recorder.record(packet, count) {
                warn!("Failed to record telemetry: {}", e);
            }
        });
    }

    if !link.connect(config.link.device_name()).await? {
        link.close().await;
        bail!("No drone connected");
    }

    info!("Press Ctrl+C to exit");

    let mut status = interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            _ = status.tick() => {
                match link.state().await {
                    Some(state) => info!(
                        "Mode {:?}/{:?}, battery {}%",
                        state.mode_vehicle, state.mode_flight, state.battery
                    ),
                    None => warn!("No state from drone"),
                }
                if let Some(voltage) = link.battery_voltage().await {
                    info!("Battery {} mV", voltage);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    link.close().await;
    info!("Decode failures: {}", link.decode_failures());

    Ok(())
}
