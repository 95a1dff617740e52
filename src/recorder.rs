// src/recorder.rs
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::drivers::TelemetryError;

/// Append-only text log of every raw line received from the device.
pub struct LineLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines_written: u64,
}

impl LineLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TelemetryError::File {
                path: path.clone(),
                source,
            })?;
        info!("raw line log: {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Writes and flushes one line. A failure disables the log instead of
    /// interrupting acquisition.
    pub fn record(&mut self, line: &str) {
        let Some(w) = &mut self.writer else {
            return;
        };
        let result = writeln!(w, "{line}").and_then(|_| w.flush());
        match result {
            Ok(()) => self.lines_written += 1,
            Err(e) => {
                warn!("raw line log {} disabled: {e}", self.path.display());
                self.writer = None;
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for LineLog {
    fn drop(&mut self) {
        if let Some(mut w) = self.writer.take() {
            w.flush().ok();
        }
    }
}
