//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::packet::protocol::MAX_FRAME_SIZE;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Port path; empty auto-selects the last enumerated port
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Ceiling on a single read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Receive queue and background task configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Inbound queue capacity, in chunks
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Reassembly buffer ceiling, in bytes
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,

    /// Silence inside a frame before it is dropped
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// State poll interval while connected
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Decode on the receive task; when false, callers drain the queue
    #[serde(default = "default_background_processing")]
    pub background_processing: bool,
}

/// Request/retry timings
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_first_resend_ms")]
    pub first_resend_ms: u64,

    #[serde(default = "default_second_resend_ms")]
    pub second_resend_ms: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_attitude_interval_ms")]
    pub attitude_interval_ms: u64,

    #[serde(default = "default_battery_interval_ms")]
    pub battery_interval_ms: u64,

    #[serde(default = "default_pressure_interval_ms")]
    pub pressure_interval_ms: u64,
}

/// Event watchdog thresholds and debounce intervals
#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "default_low_battery_percent")]
    pub low_battery_percent: u8,

    #[serde(default = "default_upside_down_interval_ms")]
    pub upside_down_interval_ms: u64,

    #[serde(default = "default_low_battery_interval_ms")]
    pub low_battery_interval_ms: u64,

    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,

    #[serde(default = "default_flying_interval_ms")]
    pub flying_interval_ms: u64,

    #[serde(default = "default_landing_interval_ms")]
    pub landing_interval_ms: u64,

    #[serde(default = "default_crash_interval_ms")]
    pub crash_interval_ms: u64,
}

/// Discovery and connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Device to connect to; empty picks the strongest signal
    #[serde(default)]
    pub device_name: String,

    /// Reset the dongle before discovery
    #[serde(default)]
    pub system_reset: bool,

    #[serde(default = "default_discover_timeout_ms")]
    pub discover_timeout_ms: u64,

    #[serde(default = "default_discover_settle_ms")]
    pub discover_settle_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_connect_settle_ms")]
    pub connect_settle_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_baud_rate() -> u32 { 115200 }
fn default_read_timeout_ms() -> u64 { 10 }

fn default_queue_capacity() -> usize { 4096 }
fn default_max_pending_bytes() -> usize { 4096 }
fn default_frame_timeout_ms() -> u64 { 600 }
fn default_keepalive_interval_ms() -> u64 { 3000 }
fn default_background_processing() -> bool { true }

fn default_poll_interval_ms() -> u64 { 10 }
fn default_first_resend_ms() -> u64 { 30 }
fn default_second_resend_ms() -> u64 { 60 }
fn default_fetch_timeout_ms() -> u64 { 150 }
fn default_attitude_interval_ms() -> u64 { 100 }
fn default_battery_interval_ms() -> u64 { 5000 }
fn default_pressure_interval_ms() -> u64 { 3000 }

fn default_low_battery_percent() -> u8 { 50 }
fn default_upside_down_interval_ms() -> u64 { 5000 }
fn default_low_battery_interval_ms() -> u64 { 10000 }
fn default_ready_interval_ms() -> u64 { 10000 }
fn default_flying_interval_ms() -> u64 { 10000 }
fn default_landing_interval_ms() -> u64 { 5000 }
fn default_crash_interval_ms() -> u64 { 3000 }

fn default_discover_timeout_ms() -> u64 { 5000 }
fn default_discover_settle_ms() -> u64 { 2000 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_connect_settle_ms() -> u64 { 1200 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_pending_bytes: default_max_pending_bytes(),
            frame_timeout_ms: default_frame_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            background_processing: default_background_processing(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            first_resend_ms: default_first_resend_ms(),
            second_resend_ms: default_second_resend_ms(),
            timeout_ms: default_fetch_timeout_ms(),
            attitude_interval_ms: default_attitude_interval_ms(),
            battery_interval_ms: default_battery_interval_ms(),
            pressure_interval_ms: default_pressure_interval_ms(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            low_battery_percent: default_low_battery_percent(),
            upside_down_interval_ms: default_upside_down_interval_ms(),
            low_battery_interval_ms: default_low_battery_interval_ms(),
            ready_interval_ms: default_ready_interval_ms(),
            flying_interval_ms: default_flying_interval_ms(),
            landing_interval_ms: default_landing_interval_ms(),
            crash_interval_ms: default_crash_interval_ms(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            system_reset: false,
            discover_timeout_ms: default_discover_timeout_ms(),
            discover_settle_ms: default_discover_settle_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_settle_ms: default_connect_settle_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            format: default_log_format(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl TransportConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

impl FetchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn first_resend(&self) -> Duration {
        Duration::from_millis(self.first_resend_ms)
    }

    pub fn second_resend(&self) -> Duration {
        Duration::from_millis(self.second_resend_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LinkConfig {
    /// Configured device name, if any
    pub fn device_name(&self) -> Option<&str> {
        (!self.device_name.is_empty()).then_some(self.device_name.as_str())
    }
}

fn invalid(message: impl std::fmt::Display) -> LinkError {
    LinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use codrone_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if ![9600, 19200, 38400, 57600, 115200, 230400].contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400",
            ));
        }

        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 1000 {
            return Err(invalid("read_timeout_ms must be between 1 and 1000"));
        }

        // Transport
        if self.transport.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be greater than 0"));
        }

        if self.transport.max_pending_bytes < MAX_FRAME_SIZE {
            return Err(invalid(format!(
                "max_pending_bytes must be at least {} (largest frame)",
                MAX_FRAME_SIZE
            )));
        }

        if self.transport.frame_timeout_ms == 0 || self.transport.frame_timeout_ms > 10000 {
            return Err(invalid("frame_timeout_ms must be between 1 and 10000"));
        }

        if self.transport.keepalive_interval_ms == 0 || self.transport.keepalive_interval_ms > 60000
        {
            return Err(invalid("keepalive_interval_ms must be between 1 and 60000"));
        }

        // Fetch timings must be strictly increasing
        let fetch = &self.fetch;
        if fetch.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than 0"));
        }

        if !(fetch.poll_interval_ms < fetch.first_resend_ms
            && fetch.first_resend_ms < fetch.second_resend_ms
            && fetch.second_resend_ms < fetch.timeout_ms)
        {
            return Err(invalid(
                "fetch timings must satisfy poll_interval_ms < first_resend_ms < second_resend_ms < timeout_ms",
            ));
        }

        // Events
        if self.events.low_battery_percent > 100 {
            return Err(invalid("low_battery_percent must be between 0 and 100"));
        }

        for (name, value) in [
            ("upside_down_interval_ms", self.events.upside_down_interval_ms),
            ("low_battery_interval_ms", self.events.low_battery_interval_ms),
            ("ready_interval_ms", self.events.ready_interval_ms),
            ("flying_interval_ms", self.events.flying_interval_ms),
            ("landing_interval_ms", self.events.landing_interval_ms),
            ("crash_interval_ms", self.events.crash_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        // Link
        if !self.link.device_name.is_empty() && self.link.device_name.chars().count() != 12 {
            return Err(invalid("device_name must be empty or exactly 12 characters"));
        }

        if self.link.discover_timeout_ms == 0 || self.link.connect_timeout_ms == 0 {
            return Err(invalid("discover_timeout_ms and connect_timeout_ms must be greater than 0"));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        Ok(())
    }
}
