//! Terminal output formatting

use chrono::{Local, TimeZone};
use colored::Colorize;
use logbridge_core::{JsonlRow, Level};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{settings::Style, Table, Tabled};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

/// What `logbridge status` found
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub url: Option<String>,
    pub source: Option<String>,
    pub pid: Option<u32>,
    pub project: Option<String>,
    pub healthy: bool,
    pub protocol: bool,
    pub latency_ms: Option<u64>,
    pub entries: Option<usize>,
    pub capacity: Option<usize>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "aggregator")]
    url: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "latency")]
    latency: String,
    #[tabled(rename = "buffer")]
    buffer: String,
}

fn dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl From<&StatusReport> for StatusRow {
    fn from(report: &StatusReport) -> Self {
        let status = match (report.healthy, report.protocol) {
            (true, true) => "online".green().to_string(),
            (true, false) => "unknown protocol".yellow().to_string(),
            (false, _) => "unreachable".red().to_string(),
        };

        let buffer = match (report.entries, report.capacity) {
            (Some(len), Some(cap)) => format!("{}/{}", len, cap),
            _ => "-".to_string(),
        };

        StatusRow {
            url: dash(report.url.as_deref()),
            source: dash(report.source.as_deref()),
            pid: dash(report.pid),
            project: dash(report.project.as_deref()),
            status,
            latency: dash(report.latency_ms.map(|ms| format!("{}ms", ms))),
            buffer,
        }
    }
}

pub fn print_status(report: &StatusReport) {
    if is_json_mode() {
        print_json(report);
        return;
    }

    if report.url.is_none() {
        println!("No aggregator found");
        return;
    }

    let table = Table::new([StatusRow::from(report)])
        .with(Style::rounded())
        .to_string();

    println!("{}", table);
}

fn format_timestamp(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn level_label(level: Level) -> String {
    let label = format!("{:5}", level.label());
    match level {
        Level::Error => label.red().bold().to_string(),
        Level::Warn => label.yellow().to_string(),
        Level::Info => label.cyan().to_string(),
        Level::Debug => label.dimmed().to_string(),
        Level::Log => label,
    }
}

/// One durable row as a terminal line
pub fn format_row(row: &JsonlRow) -> String {
    let mut line = format!("{} {} ", format_timestamp(row.timestamp).dimmed(), level_label(row.level));

    if let Some(project) = &row.project {
        line.push_str(&format!("{} ", format!("[{}]", project).blue()));
    }

    line.push_str(&row.message);

    if let Some(source) = &row.source {
        line.push_str(&format!(" {}", format!("({})", source).dimmed()));
    }

    line
}

/// Print durable rows, one JSON object per line in JSON mode
pub fn print_rows(rows: &[JsonlRow]) {
    for row in rows {
        print_row(row);
    }
}

pub fn print_row(row: &JsonlRow) {
    if is_json_mode() {
        match serde_json::to_string(row) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
    } else {
        println!("{}", format_row(row));
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
