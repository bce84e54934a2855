//! Session folder layout and the `current` pointer

use chrono::Utc;
use logbridge_core::{constants, Error, Result, SessionMode};
use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Location of one session's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// Path of the session folder relative to the base directory
    pub relative: String,
    /// Absolute path of the session's JSONL file
    pub file: PathBuf,
}

fn session_name(mode: SessionMode) -> String {
    match mode {
        SessionMode::Single => constants::SINGLE_SESSION.to_string(),
        SessionMode::Session => Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string(),
    }
}

fn paths_for(base: &Path, relative: &str) -> SessionPaths {
    SessionPaths {
        relative: relative.to_string(),
        file: base.join(relative).join(constants::SESSION_LOG_FILE),
    }
}

/// Create (if absent) the session folder and log file, and point `current` at it
pub fn ensure_session(base: &Path, mode: SessionMode) -> Result<SessionPaths> {
    let relative = format!("{}/{}", constants::SESSIONS_DIR, session_name(mode));
    let paths = paths_for(base, &relative);

    if let Some(dir) = paths.file.parent() {
        fs::create_dir_all(dir)?;
    }

    // Touch the log file
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.file)?;

    fs::write(base.join(constants::CURRENT_FILE), &relative)?;
    debug!("Active session: {}", paths.file.display());

    Ok(paths)
}

/// Read the `current` pointer back; `None` if no session was ever created
pub fn current_session(base: &Path) -> Result<Option<SessionPaths>> {
    let pointer = base.join(constants::CURRENT_FILE);
    if !pointer.exists() {
        return Ok(None);
    }

    let relative = fs::read_to_string(&pointer)?.trim().to_string();
    if relative.is_empty() {
        return Ok(None);
    }

    let escapes = Path::new(&relative)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::config(format!(
            "Invalid session pointer in {}: {}",
            pointer.display(),
            relative
        )));
    }

    Ok(Some(paths_for(base, &relative)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_mode_is_stable() {
        let dir = TempDir::new().unwrap();

        let first = ensure_session(dir.path(), SessionMode::Single).unwrap();
        fs::write(&first.file, "{}\n").unwrap();
        let second = ensure_session(dir.path(), SessionMode::Single).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.relative, "sessions/single");
        // Existing content is not truncated
        assert_eq!(fs::read_to_string(&second.file).unwrap(), "{}\n");
    }

    #[test]
    fn test_session_mode_writes_pointer() {
        let dir = TempDir::new().unwrap();

        let paths = ensure_session(dir.path(), SessionMode::Session).unwrap();
        assert!(paths.file.exists());
        assert!(paths.relative.starts_with("sessions/"));

        let current = current_session(dir.path()).unwrap().unwrap();
        assert_eq!(current, paths);
    }

    #[test]
    fn test_current_session_missing() {
        let dir = TempDir::new().unwrap();
        assert!(current_session(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_current_session_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(constants::CURRENT_FILE), "../../etc").unwrap();
        assert!(current_session(dir.path()).is_err());
    }
}
