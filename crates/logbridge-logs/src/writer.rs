//! JSONL appends with message truncation and size-based rotation

use logbridge_core::{constants, JsonlRow, Result};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::rotation::{prune_backups, rotate, RotationConfig};

/// Truncate `message` to at most `max_bytes` UTF-8 bytes, ending with an
/// ellipsis that fits inside the budget. Never splits a character.
pub fn truncate_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }

    let marker = if max_bytes >= constants::ELLIPSIS.len() {
        constants::ELLIPSIS
    } else {
        ""
    };
    let budget = max_bytes - marker.len();

    let end = floor_char_boundary(message, budget);

    format!("{}{}", &message[..end], marker)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Append one row as a single line. The file is opened, written with one
/// `write_all` of the line plus newline, and closed again on every call.
/// Returns the number of bytes written.
pub fn append(file: &Path, row: &JsonlRow) -> Result<u64> {
    let mut row = row.clone();
    row.message = truncate_message(&row.message, constants::MAX_MESSAGE_BYTES);

    let mut line = serde_json::to_string(&row)?;
    line.push('\n');

    let mut handle = OpenOptions::new().create(true).append(true).open(file)?;
    handle.write_all(line.as_bytes())?;

    Ok(line.len() as u64)
}

/// A session file with rotation
pub struct SessionLog {
    path: PathBuf,
    config: RotationConfig,
    // Serializes appends with the rotation that may follow them
    lock: Mutex<()>,
}

impl SessionLog {
    pub fn new(path: PathBuf, config: RotationConfig) -> Self {
        Self {
            path,
            config,
            lock: Mutex::new(()),
        }
    }

    /// Append a row, rotating once the file reaches the size limit
    pub fn append(&self, row: &JsonlRow) -> Result<()> {
        let _guard = self.lock.lock();
        append(&self.path, row)?;

        let size = std::fs::metadata(&self.path)?.len();
        if size >= self.config.max_size_bytes {
            let backup = rotate(&self.path)?;
            debug!("Rotated session log to {}", backup.display());
            if let Err(e) = prune_backups(&self.path, self.config.max_files) {
                warn!("Failed to prune session log backups: {}", e);
            }
        }

        Ok(())
    }

    /// Append several rows in order
    pub fn append_all<'a, I>(&self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a JsonlRow>,
    {
        for row in rows {
            self.append(row)?;
        }
        Ok(())
    }

    /// Rotate on demand
    pub fn rotate(&self) -> Result<PathBuf> {
        let _guard = self.lock.lock();
        rotate(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbridge_core::Level;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_short_message_untouched() {
        assert_eq!(truncate_message("hello", 10), "hello");
        assert_eq!(truncate_message("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_ascii() {
        let out = truncate_message("abcdefghij", 8);
        assert_eq!(out, "abcde…");
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_truncate_never_splits_multibyte() {
        // Each 'é' is 2 bytes, each '😀' is 4 bytes
        let message = "é😀é😀é😀é😀é😀";
        for budget in 0..message.len() {
            let out = truncate_message(message, budget);
            assert!(out.len() <= budget, "budget {} produced {} bytes", budget, out.len());
            // Valid UTF-8 by construction; the kept prefix must be a prefix of the input
            let kept = out.trim_end_matches('…');
            assert!(message.starts_with(kept));
        }
    }

    #[test]
    fn test_append_writes_one_line() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");

        let written = append(&file, &JsonlRow::new(Level::Info, "hello")).unwrap();
        append(&file, &JsonlRow::new(Level::Error, "world")).unwrap();

        let content = fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(written as usize, lines[0].len() + 1);
        assert!(lines[1].contains("\"level\":\"error\""));
    }

    #[test]
    fn test_append_truncates_message() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");

        let long = "x".repeat(constants::MAX_MESSAGE_BYTES * 2);
        append(&file, &JsonlRow::new(Level::Log, long)).unwrap();

        let content = fs::read_to_string(&file).unwrap();
        let row: JsonlRow = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(row.message.len(), constants::MAX_MESSAGE_BYTES);
        assert!(row.message.ends_with('…'));
    }

    #[test]
    fn test_session_log_rotates_at_size() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("logs.jsonl");
        let log = SessionLog::new(file.clone(), RotationConfig::new(200, 2));

        for i in 0..20 {
            log.append(&JsonlRow::new(Level::Info, format!("line {} with padding", i)))
                .unwrap();
        }

        assert!(file.exists());
        assert!(fs::metadata(&file).unwrap().len() < 200);
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("logs.jsonl."))
            .count();
        assert!(backups >= 1 && backups <= 2);
    }
}
