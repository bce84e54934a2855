//! Logs command implementation

use anyhow::{anyhow, Result};
use logbridge_core::{JsonlRow, Level};
use logbridge_logs::{follow, read, ReadOptions};
use regex::Regex;

use super::Context;
use crate::cli::LogsArgs;
use crate::output::{print_row, print_rows};

fn read_options(args: &LogsArgs) -> ReadOptions {
    ReadOptions {
        since_id: args.since_id,
        file_id: args.file_id,
        since_ms: args.since_ms,
        levels: args.level.as_deref().map(Level::parse_list),
        project: args.project.clone(),
        contains: args.contains.clone(),
        limit: args.limit,
    }
}

fn grep_matches(regex: Option<&Regex>, row: &JsonlRow) -> bool {
    regex.map_or(true, |re| re.is_match(&row.message))
}

pub async fn execute(ctx: &Context, args: LogsArgs) -> Result<()> {
    // Compile grep pattern if provided
    let grep_regex = match &args.grep {
        Some(pattern) => {
            Some(Regex::new(pattern).map_err(|e| anyhow!("Invalid regex pattern: {}", e))?)
        }
        None => None,
    };

    let session = ctx.require_session(args.dir.as_deref())?;
    let options = read_options(&args);

    let result = read(&session.file, &options)?;
    let rows: Vec<JsonlRow> = result
        .rows
        .into_iter()
        .filter(|row| grep_matches(grep_regex.as_ref(), row))
        .collect();
    print_rows(&rows);

    if !args.follow {
        return Ok(());
    }

    let follow_options = ReadOptions {
        file_id: result.file_id,
        limit: None,
        ..options
    };
    let mut rx = follow(session.file, result.next_since_id, follow_options);

    loop {
        tokio::select! {
            row = rx.recv() => match row {
                Some(row) if grep_matches(grep_regex.as_ref(), &row) => print_row(&row),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
