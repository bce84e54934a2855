//! Log rotation

use chrono::{SecondsFormat, Utc};
use logbridge_core::{constants, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Size-based rotation configuration
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Rotate once the file reaches this size in bytes
    pub max_size_bytes: u64,
    /// Maximum number of rotated backups to keep
    pub max_files: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: constants::DEFAULT_LOG_MAX_SIZE,
            max_files: constants::DEFAULT_LOG_MAX_FILES,
        }
    }
}

impl RotationConfig {
    pub fn new(max_size_bytes: u64, max_files: usize) -> Self {
        Self {
            max_size_bytes,
            max_files,
        }
    }
}

/// Backup name for `file` at the current instant: `{file}.{ISO timestamp}`
/// with `:` and `.` replaced by `-`
pub fn rotated_path(file: &Path) -> PathBuf {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.with_file_name(format!("{}.{}", name, stamp))
}

/// Rename the file to a timestamped backup and recreate it empty.
///
/// If the file does not exist the backup name is returned without renaming.
pub fn rotate(file: &Path) -> Result<PathBuf> {
    let mut target = rotated_path(file);

    if !file.exists() {
        return Ok(target);
    }

    // Two rotations within the same millisecond must not clobber a backup
    let mut suffix = 1;
    while target.exists() {
        let base = rotated_path(file);
        target = PathBuf::from(format!("{}-{}", base.display(), suffix));
        suffix += 1;
    }

    debug!("Rotating {} -> {}", file.display(), target.display());
    fs::rename(file, &target)?;
    File::create(file)?;

    Ok(target)
}

/// Rotated backups of `file`, oldest first
pub(crate) fn list_backups(file: &Path) -> Result<Vec<PathBuf>> {
    let (Some(dir), Some(name)) = (file.parent(), file.file_name()) else {
        return Ok(vec![]);
    };
    let prefix = format!("{}.", name.to_string_lossy());

    let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().starts_with(&prefix))
                .unwrap_or(false)
        })
        .collect();

    // Timestamped names sort chronologically
    backups.sort();
    Ok(backups)
}

/// Delete the oldest backups of `file` beyond `max_files`.
/// Returns the number of backups removed.
pub fn prune_backups(file: &Path, max_files: usize) -> Result<usize> {
    let backups = list_backups(file)?;
    if backups.len() <= max_files {
        return Ok(0);
    }

    let excess = backups.len() - max_files;
    let mut removed = 0;
    for path in backups.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old backup {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotated_path_format() {
        let path = rotated_path(Path::new("/var/log/logs.jsonl"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let stamp = name.strip_prefix("logs.jsonl.").unwrap();
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn test_rotate_moves_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");
        fs::write(&file, "line one\nline two\n").unwrap();

        let backup = rotate(&file).unwrap();

        assert!(file.exists());
        assert_eq!(fs::read_to_string(&file).unwrap(), "");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_rotate_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");

        let backup = rotate(&file).unwrap();

        assert!(!file.exists());
        assert!(!backup.exists());
        assert!(backup.to_string_lossy().contains("logs.jsonl."));
    }

    #[test]
    fn test_prune_backups() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");
        for stamp in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"] {
            fs::write(dir.path().join(format!("logs.jsonl.{}", stamp)), "x").unwrap();
        }
        fs::write(&file, "").unwrap();

        assert_eq!(prune_backups(&file, 2).unwrap(), 2);
        assert!(!dir.path().join("logs.jsonl.2024-01-01").exists());
        assert!(dir.path().join("logs.jsonl.2024-01-04").exists());
        assert!(file.exists());
    }
}
