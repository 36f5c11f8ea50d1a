//! Per-site, append-only audit log of pipeline outcomes.
//!
//! Each entry is a `---` line, a UTC timestamp line and the message. The
//! pipeline only ever appends; it never truncates or reads back.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Clone)]
pub struct AuditLog {
    logs_root: PathBuf,
}

impl AuditLog {
    pub fn new(logs_root: impl Into<PathBuf>) -> Self {
        Self {
            logs_root: logs_root.into(),
        }
    }

    /// `<logs-root>/<site>.txt`
    pub fn path_for(&self, site: &str) -> PathBuf {
        self.logs_root.join(format!("{site}.txt"))
    }

    pub fn append(&self, site: &str, message: &str) -> io::Result<()> {
        append_entry(&self.path_for(site), Utc::now(), message)
    }
}

/// Append one entry to `path`, creating parent directories as needed.
pub fn append_entry(path: &Path, at: DateTime<Utc>, message: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let entry = format!("---\n{}\n{}\n", at.format(TIMESTAMP_FORMAT), message);
    file.write_all(entry.as_bytes())
}
