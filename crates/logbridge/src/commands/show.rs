//! Show command implementation

use anyhow::{bail, Result};

use super::Context;
use crate::output::print_info;

pub async fn execute(ctx: &Context, session: Option<String>, tag: Option<String>) -> Result<()> {
    let resolved = ctx.require_aggregator()?;

    let mut params = Vec::new();
    if let Some(session) = session {
        params.push(("session", session));
    }
    if let Some(tag) = tag {
        params.push(("tag", tag));
    }

    let response = reqwest::Client::new()
        .get(resolved.endpoint.text_url())
        .query(&params)
        .timeout(ctx.config.producer.forward_timeout() * 4)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        bail!("Aggregator returned {}", status);
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        print_info("Buffer is empty");
    } else {
        println!("{}", text.trim_end());
    }

    Ok(())
}
