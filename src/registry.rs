//! Durable on-disk registry of scratch databases awaiting cleanup.
//!
//! Every live scratch database has exactly one record file in the
//! registry directory (the platform temp directory unless overridden).
//! Records survive process crashes; a later session with the same
//! discriminator sweeps them up. The record format is two UTF-8 lines:
//! the database name, then the absolute path of the record file itself,
//! so a loaded record carries everything needed to delete itself.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::{Result, ScratchError};
use crate::ident;

/// File name prefix for registry records.
const RECORD_PREFIX: &str = "sdb";

/// Registry of scratch-database records for one connection backend.
///
/// The discriminator is encoded in the record file extension so sweeps
/// only ever touch records written by a compatible backend.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
    discriminator: String,
}

/// A single durable record: "this database exists and must eventually
/// be dropped".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    database: String,
    path: PathBuf,
}

impl RegistryRecord {
    /// Name of the database this record tracks.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Registry {
    /// Registry in the platform temp directory.
    pub fn new(discriminator: &str) -> Self {
        Self::with_dir(std::env::temp_dir(), discriminator)
    }

    /// Registry in a caller-chosen directory.
    ///
    /// Tests use this to keep their records out of the shared temp
    /// directory.
    pub fn with_dir(dir: impl Into<PathBuf>, discriminator: &str) -> Self {
        Self {
            dir: dir.into(),
            discriminator: discriminator.to_string(),
        }
    }

    /// The directory records are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn suffix(&self) -> String {
        format!(".scratchdb-{}", self.discriminator)
    }

    /// Persist a record for `database`.
    ///
    /// The write is atomic: the content lands in a temp file first and is
    /// renamed into place, so a crash mid-write never leaves a record
    /// that parses as valid but points at the wrong database.
    pub fn register(&self, database: &str) -> Result<RegistryRecord> {
        let file_name = format!("{}{}{}", RECORD_PREFIX, ident::random_hex(), self.suffix());
        let path = self.dir.join(file_name);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        writeln!(tmp, "{database}")?;
        writeln!(tmp, "{}", path.display())?;
        tmp.persist(&path)
            .map_err(|e| ScratchError::Registry(format!("persist {}: {}", path.display(), e)))?;

        debug!(database, path = %path.display(), "registered scratch database");
        Ok(RegistryRecord {
            database: database.to_string(),
            path,
        })
    }

    /// Record files in this registry with a matching discriminator.
    ///
    /// An unreadable directory yields an empty list; enumeration failures
    /// must never break session construction.
    pub fn scan(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot scan registry directory");
                return Vec::new();
            }
        };

        let suffix = self.suffix();
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(RECORD_PREFIX) && n.ends_with(&suffix))
            })
            .collect()
    }

    /// Load a record from a file.
    ///
    /// Returns `None` for missing, empty, or partially written files:
    /// a record that cannot be read is treated as absent, not as an
    /// error, because a concurrent teardown may have deleted it already.
    pub fn load(path: &Path) -> Option<RegistryRecord> {
        let content = fs::read_to_string(path).ok()?;
        let mut lines = content.lines();
        let database = lines.next()?.trim();
        let stored_path = lines.next()?.trim();
        if database.is_empty() || stored_path.is_empty() {
            return None;
        }
        Some(RegistryRecord {
            database: database.to_string(),
            path: PathBuf::from(stored_path),
        })
    }

    /// Delete a record file. Already-gone is success: self-teardown and a
    /// concurrent sweep may both try to remove the same record.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed registry record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScratchError::Registry(format!(
                "remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
