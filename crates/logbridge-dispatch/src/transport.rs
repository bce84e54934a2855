//! Network transport to the aggregator

use async_trait::async_trait;
use logbridge_core::{constants, AggregatorEndpoint, Batch, Error, Result};
use logbridge_health::LivenessProber;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Trait for aggregator transports. Every call is bounded by a timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a batch to the ingestion endpoint
    async fn forward(&self, endpoint: &AggregatorEndpoint, batch: &Batch) -> Result<()>;

    /// Liveness check
    async fn probe(&self, endpoint: &AggregatorEndpoint) -> bool;

    /// Capability check: does the endpoint speak this protocol?
    async fn verify(&self, endpoint: &AggregatorEndpoint) -> bool;
}

/// HTTP transport backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
    prober: LivenessProber,
    forward_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(forward_timeout: Duration, probe_timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), forward_timeout, probe_timeout)
    }

    /// Create with a custom HTTP client
    pub fn with_client(
        client: reqwest::Client,
        forward_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            prober: LivenessProber::with_client(client.clone()),
            client,
            forward_timeout,
            probe_timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn forward(&self, endpoint: &AggregatorEndpoint, batch: &Batch) -> Result<()> {
        let url = endpoint.ingest_url();
        let mut request = self.client.post(&url).json(batch);
        if let Some(token) = &endpoint.token {
            request = request.header(constants::TOKEN_HEADER, token);
        }

        debug!("Forwarding {} entries to {}", batch.len(), url);

        let response = timeout(self.forward_timeout, request.send())
            .await
            .map_err(|_| Error::Timeout(format!("forward to {}", url)))?
            .map_err(|e| Error::AggregatorUnreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::http(format!("{} returned {}", url, status.as_u16())))
        }
    }

    async fn probe(&self, endpoint: &AggregatorEndpoint) -> bool {
        self.prober.probe(endpoint, self.probe_timeout).await.healthy
    }

    async fn verify(&self, endpoint: &AggregatorEndpoint) -> bool {
        self.prober.verify_protocol(endpoint, self.probe_timeout).await
    }
}
