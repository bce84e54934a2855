//! Local printing fallback

use colored::Colorize;
use logbridge_core::{render_entry, Batch, Level};
use std::io::Write;

/// Where batches go when they are not (only) forwarded
pub trait LocalSink: Send + Sync {
    fn print(&self, batch: &Batch);
}

/// Prints rendered entries to stderr, colored by level
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl StderrSink {
    pub fn new() -> Self {
        Self
    }
}

fn colorize(level: Level, line: String) -> String {
    match level {
        Level::Error => line.red().to_string(),
        Level::Warn => line.yellow().to_string(),
        Level::Info => line.cyan().to_string(),
        Level::Debug => line.dimmed().to_string(),
        Level::Log => line,
    }
}

impl LocalSink for StderrSink {
    fn print(&self, batch: &Batch) {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        for entry in &batch.entries {
            // Nothing useful to do if stderr is gone
            let _ = writeln!(out, "{}", colorize(entry.level, render_entry(entry)));
        }
    }
}
