//! Rotate command implementation

use anyhow::Result;
use logbridge_logs::{prune_backups, RotationConfig, SessionLog};
use std::path::PathBuf;
use tracing::warn;

use super::Context;
use crate::output::{is_json_mode, print_json, print_success};

pub fn execute(ctx: &Context, dir: Option<PathBuf>) -> Result<()> {
    let session = ctx.require_session(dir.as_deref())?;
    let store = &ctx.config.store;

    let log = SessionLog::new(
        session.file.clone(),
        RotationConfig::new(store.max_size_bytes, store.max_files),
    );
    let backup = log.rotate()?;

    if let Err(e) = prune_backups(log.path(), store.max_files) {
        warn!("Failed to prune backups: {}", e);
    }

    if is_json_mode() {
        print_json(&serde_json::json!({
            "session": session.relative,
            "backup": backup.display().to_string(),
        }));
    } else {
        print_success(&format!("Rotated {} to {}", session.relative, backup.display()));
    }

    Ok(())
}
