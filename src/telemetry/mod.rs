//! # Telemetry Module
//!
//! Records decoded packets to JSONL files with rotation.
//!
//! Each line is one packet: receive timestamp, data type, per-type count and
//! the decoded payload. Files rotate after a fixed number of records and only
//! the newest files are kept.

pub mod recorder;

pub use recorder::TelemetryRecorder;
