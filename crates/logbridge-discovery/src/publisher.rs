//! Aggregator-side discovery record publishing

use logbridge_core::{constants, now_ms, DiscoveryRecord, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Write a record atomically: write a temporary sibling, then rename it into place
pub fn write_record(path: &Path, record: &DiscoveryRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| constants::DISCOVERY_FILE.to_string());
    let tmp = path.with_file_name(format!("{}.{}.tmp", name, std::process::id()));

    let json = serde_json::to_string_pretty(record)?;
    if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    Ok(())
}

/// Read a record; missing, unreadable, or half-written files are "no record"
pub fn read_record(path: &Path) -> Option<DiscoveryRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Ignoring unreadable discovery record {}: {}", path.display(), e);
            None
        }
    }
}

/// Advertises a running aggregator via discovery record files
#[derive(Debug)]
pub struct DiscoveryPublisher {
    record: DiscoveryRecord,
    primary: PathBuf,
    legacy: Option<PathBuf>,
}

impl DiscoveryPublisher {
    /// Publisher writing to `dir/.logbridge.json`
    pub fn new(record: DiscoveryRecord, dir: &Path) -> Self {
        Self {
            record,
            primary: dir.join(constants::DISCOVERY_FILE),
            legacy: None,
        }
    }

    /// Also write the shared temp-dir record at `path`
    pub fn with_legacy(mut self, path: Option<PathBuf>) -> Self {
        self.legacy = path;
        self
    }

    pub fn record(&self) -> &DiscoveryRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        &self.primary
    }

    /// Write (or overwrite) the record with a fresh timestamp.
    /// Calling this periodically keeps the record from going stale.
    pub fn publish(&self) -> Result<()> {
        let mut record = self.record.clone();
        record.timestamp = now_ms();

        write_record(&self.primary, &record)?;
        debug!("Published discovery record to {}", self.primary.display());

        if let Some(legacy) = &self.legacy {
            if let Err(e) = write_record(legacy, &record) {
                warn!("Failed to write legacy discovery record {}: {}", legacy.display(), e);
            }
        }

        Ok(())
    }

    /// Best-effort removal of records that still belong to this process
    pub fn cleanup(&self) {
        let paths = std::iter::once(&self.primary).chain(self.legacy.iter());
        for path in paths {
            let owned = read_record(path)
                .map(|r| r.pid == self.record.pid)
                .unwrap_or(false);
            if !owned {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => info!("Removed discovery record {}", path.display()),
                Err(e) => warn!("Failed to remove discovery record {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for DiscoveryPublisher {
    fn drop(&mut self) {
        self.cleanup();
    }
}
