//! Status command implementation

use anyhow::Result;
use logbridge_core::constants;
use logbridge_health::LivenessProber;
use serde::Deserialize;
use tracing::debug;

use super::{read_envelope, Context};
use crate::output::{print_status, StatusReport};

#[derive(Debug, Deserialize)]
struct StatsData {
    len: usize,
    capacity: usize,
}

pub async fn execute(ctx: &Context) -> Result<()> {
    let producer = &ctx.config.producer;

    let Some(resolved) = ctx.resolver().resolve() else {
        print_status(&StatusReport {
            url: None,
            source: None,
            pid: None,
            project: None,
            healthy: false,
            protocol: false,
            latency_ms: None,
            entries: None,
            capacity: None,
        });
        return Ok(());
    };

    let endpoint = &resolved.endpoint;
    let prober = LivenessProber::new();
    let probe = prober.probe(endpoint, producer.probe_timeout()).await;
    let protocol = probe.healthy && prober.verify_protocol(endpoint, producer.probe_timeout()).await;

    let mut stats = None;
    if protocol {
        let response = reqwest::Client::new()
            .get(endpoint.route_url(constants::STATS_ROUTE))
            .timeout(producer.probe_timeout() * 2)
            .send()
            .await;
        match response {
            Ok(response) => match read_envelope::<StatsData>(response).await {
                Ok(data) => stats = Some(data),
                Err(e) => debug!("Stats unavailable: {}", e),
            },
            Err(e) => debug!("Stats request failed: {}", e),
        }
    }

    let record = resolved.record.as_ref();
    print_status(&StatusReport {
        url: Some(endpoint.base_url.clone()),
        source: Some(resolved.source.to_string()),
        pid: record.map(|r| r.pid),
        project: record.and_then(|r| r.project.clone()),
        healthy: probe.healthy,
        protocol,
        latency_ms: probe.healthy.then_some(probe.duration_ms),
        entries: stats.as_ref().map(|s| s.len),
        capacity: stats.as_ref().map(|s| s.capacity),
    });

    Ok(())
}
