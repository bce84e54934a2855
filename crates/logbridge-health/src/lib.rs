//! logbridge Health - Aggregator liveness probes
//!
//! Bounded-timeout HTTP checks against an aggregator's liveness and
//! capabilities endpoints. A probe that exceeds its timeout is abandoned.

use chrono::{DateTime, Utc};
use logbridge_core::{AggregatorEndpoint, Capabilities};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Probe result
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl ProbeResult {
    pub fn healthy(duration_ms: u64) -> Self {
        Self {
            healthy: true,
            timestamp: Utc::now(),
            duration_ms,
            message: None,
        }
    }

    pub fn unhealthy(duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            timestamp: Utc::now(),
            duration_ms,
            message: Some(message.into()),
        }
    }
}

/// Issues liveness and capability requests
#[derive(Debug, Clone)]
pub struct LivenessProber {
    client: reqwest::Client,
}

impl LivenessProber {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET the liveness endpoint; any 2xx within `limit` is healthy
    pub async fn probe(&self, endpoint: &AggregatorEndpoint, limit: Duration) -> ProbeResult {
        let url = endpoint.health_url();
        let start = Instant::now();

        let result = timeout(limit, self.client.get(&url).send()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) if response.status().is_success() => {
                debug!("Liveness probe passed: {} returned {}", url, response.status());
                ProbeResult::healthy(duration_ms)
            }
            Ok(Ok(response)) => {
                debug!("Liveness probe failed: {} returned {}", url, response.status());
                ProbeResult::unhealthy(
                    duration_ms,
                    format!("Unexpected status: {}", response.status().as_u16()),
                )
            }
            Ok(Err(e)) => {
                debug!("Liveness probe failed: {} - {}", url, e);
                ProbeResult::unhealthy(duration_ms, format!("Request failed: {}", e))
            }
            Err(_) => {
                debug!("Liveness probe timed out: {}", url);
                ProbeResult::unhealthy(duration_ms, "Timeout")
            }
        }
    }

    /// Confirm the endpoint speaks this protocol, not just that a port is open
    pub async fn verify_protocol(&self, endpoint: &AggregatorEndpoint, limit: Duration) -> bool {
        let url = endpoint.capabilities_url();

        let request = async {
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Ok::<_, reqwest::Error>(None);
            }
            response.json::<Capabilities>().await.map(Some)
        };

        match timeout(limit, request).await {
            Ok(Ok(Some(caps))) if caps.is_compatible() => true,
            Ok(Ok(Some(caps))) => {
                debug!(
                    "Ignoring {}: speaks {} v{}",
                    endpoint, caps.protocol, caps.version
                );
                false
            }
            Ok(Ok(None)) => {
                debug!("Ignoring {}: no capabilities endpoint", endpoint);
                false
            }
            Ok(Err(e)) => {
                debug!("Capability check failed for {}: {}", endpoint, e);
                false
            }
            Err(_) => {
                debug!("Capability check timed out for {}", endpoint);
                false
            }
        }
    }
}

impl Default for LivenessProber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve every connection with the same canned HTTP response
    async fn canned_server(response: &'static str) -> AggregatorEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        AggregatorEndpoint::from_url(&format!("http://{}", addr))
    }

    async fn closed_endpoint() -> AggregatorEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        AggregatorEndpoint::from_url(&format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_probe_no_content_is_healthy() {
        let endpoint = canned_server("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await;
        let result = LivenessProber::new()
            .probe(&endpoint, Duration::from_secs(2))
            .await;
        assert!(result.healthy);
    }

    #[tokio::test]
    async fn test_probe_closed_port_is_unhealthy() {
        let endpoint = closed_endpoint().await;
        let result = LivenessProber::new()
            .probe(&endpoint, Duration::from_millis(400))
            .await;
        assert!(!result.healthy);
        assert!(result.message.is_some());
    }

    #[tokio::test]
    async fn test_probe_server_error_is_unhealthy() {
        let endpoint = canned_server(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let result = LivenessProber::new()
            .probe(&endpoint, Duration::from_secs(2))
            .await;
        assert!(!result.healthy);
        assert_eq!(result.message.as_deref(), Some("Unexpected status: 500"));
    }

    #[tokio::test]
    async fn test_verify_protocol_accepts_logbridge() {
        let endpoint = canned_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 36\r\nConnection: close\r\n\r\n{\"protocol\":\"logbridge\",\"version\":1}",
        )
        .await;
        assert!(
            LivenessProber::new()
                .verify_protocol(&endpoint, Duration::from_secs(2))
                .await
        );
    }

    #[tokio::test]
    async fn test_verify_protocol_rejects_unrelated_service() {
        let endpoint = canned_server(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 13\r\nConnection: close\r\n\r\n<html></html>",
        )
        .await;
        assert!(
            !LivenessProber::new()
                .verify_protocol(&endpoint, Duration::from_secs(2))
                .await
        );
    }
}
