//! Clear command implementation

use anyhow::Result;
use logbridge_core::{constants, ClearMode, Scope};
use serde::Deserialize;

use super::{authorize, read_envelope, Context};
use crate::cli::ClearArgs;
use crate::output::{is_json_mode, print_json, print_success};

#[derive(Debug, Deserialize)]
struct Cleared {
    removed: usize,
}

pub async fn execute(ctx: &Context, args: ClearArgs) -> Result<()> {
    let scope: Option<Scope> = args.scope.as_deref().map(str::parse::<Scope>).transpose()?;
    let mode = args.mode();

    let resolved = ctx.require_aggregator()?;
    let endpoint = &resolved.endpoint;

    let request = reqwest::Client::new()
        .post(endpoint.route_url(constants::CLEAR_ROUTE))
        .timeout(ctx.config.producer.forward_timeout() * 4)
        .json(&serde_json::json!({ "scope": scope, "mode": mode }));
    let response = authorize(request, endpoint).send().await?;
    let cleared: Cleared = read_envelope(response).await?;

    if is_json_mode() {
        print_json(&serde_json::json!({ "removed": cleared.removed, "mode": mode }));
    } else {
        let target = scope.map(|s| s.key()).unwrap_or_else(|| "all entries".to_string());
        let verb = match mode {
            ClearMode::Soft => "Hid",
            ClearMode::Hard => "Removed",
        };
        print_success(&format!("{} {} ({} entries removed)", verb, target, cleared.removed));
    }

    Ok(())
}
