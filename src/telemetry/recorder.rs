//! JSONL packet recorder

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::packet::decoder::DecodedPacket;
use crate::packet::payload::Payload;
use crate::packet::protocol::DataType;

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// One line of a telemetry file
#[derive(Debug, Serialize)]
struct Line<'a> {
    timestamp: String,
    data_type: DataType,
    count: u64,
    payload: &'a Payload,
}

/// Writes decoded packets to rotating JSONL files
#[derive(Debug)]
pub struct TelemetryRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl TelemetryRecorder {
    /// Create the recorder, creating `log_dir` if needed
    ///
    /// No file is opened until the first record arrives.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        info!("Recording telemetry to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            writer: None,
            current: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// Append one packet
    pub fn record(&mut self, packet: &DecodedPacket, count: u64) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = Line {
            timestamp: Utc::now().to_rfc3339(),
            data_type: packet.header.data_type,
            count,
            payload: &packet.payload,
        };

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// File currently being written, if any
    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.sequence += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);

        debug!("Opening telemetry file {}", path.display());
        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.current = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest files beyond `max_files_to_keep`
    fn prune(&self) -> Result<()> {
        let mut files = telemetry_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names sort chronologically
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

fn telemetry_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_telemetry = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(FILE_PREFIX))
            && path.extension().is_some_and(|ext| ext == FILE_EXTENSION);
        if is_telemetry {
            files.push(path);
        }
    }
    Ok(files)
}
