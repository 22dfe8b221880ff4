//! Per-endpoint NIC log file.
//!
//! Process-level logging goes through `tracing`; the NIC log is a separate
//! plain-text sink the manager tails per endpoint. Writes are best-effort so
//! the token pump never blocks on logging, and the file is flushed per line
//! in debug builds only.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Append-style log file for one NIC endpoint.
#[derive(Debug)]
pub struct NicLog {
    out: BufWriter<File>,
}

impl NicLog {
    /// Create (truncate) the log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        tracing::info!("NIC log at {}", path.display());
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Write one line. Failures are swallowed; a lost log line must not
    /// desynchronize the simulation.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.write_all(b"\n");
        if cfg!(debug_assertions) {
            let _ = self.out.flush();
        }
    }
}

/// Write a formatted line to an `Option<NicLog>`, doing nothing when no log
/// was configured.
macro_rules! niclog {
    ($log:expr, $($arg:tt)*) => {
        if let Some(log) = $log.as_mut() {
            log.line(format_args!($($arg)*));
        }
    };
}

pub(crate) use niclog;
