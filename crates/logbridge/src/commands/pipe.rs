//! Pipe command implementation

use anyhow::Result;
use logbridge_core::{now_ms, Batch, Entry, Level};
use logbridge_dispatch::ProducerContext;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::Context;
use crate::cli::PipeArgs;

/// Partial batches are sent after this much idle input
const FLUSH_AFTER: Duration = Duration::from_millis(100);

struct LineTemplate {
    session: String,
    level: Level,
    tag: Option<String>,
    project: Option<String>,
    source: Option<String>,
}

impl LineTemplate {
    fn from_args(args: &PipeArgs, default_project: Option<String>) -> Self {
        Self {
            session: args
                .session
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            level: Level::normalize(&args.level),
            tag: args.tag.clone(),
            project: args.project.clone().or(default_project),
            source: args.source.clone(),
        }
    }

    fn entry(&self, line: String) -> Entry {
        let mut entry = Entry::new(&self.session, self.level, line).at(now_ms());
        entry.tag = self.tag.clone();
        entry.project = self.project.clone();
        entry.source = self.source.clone();
        entry
    }

    fn batch(&self, entries: Vec<Entry>) -> Batch {
        Batch::new(&self.session, entries)
    }
}

pub async fn execute(ctx: &Context, args: PipeArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(echo) = args.echo {
        config.producer.echo = echo.into();
    }

    let template = LineTemplate::from_args(&args, config.producer.project.clone());
    let batch_size = args.batch.max(1);
    info!("Piping stdin as session {}", template.session);

    let producer = ProducerContext::from_config(&config, &ctx.cwd);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Vec<Entry> = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        pending.push(template.entry(line));
                        total += 1;
                        if pending.len() >= batch_size {
                            producer.submit(template.batch(std::mem::take(&mut pending)));
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(FLUSH_AFTER), if !pending.is_empty() => {
                producer.submit(template.batch(std::mem::take(&mut pending)));
            }
        }
    }

    if !pending.is_empty() {
        producer.submit(template.batch(pending));
    }

    producer.shutdown().await;
    debug!("Piped {} lines", total);

    Ok(())
}
