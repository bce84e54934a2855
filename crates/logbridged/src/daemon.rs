//! Aggregator orchestration

use logbridge_buffer::RingBuffer;
use logbridge_core::{constants, ConfigFile, DiscoveryRecord, Result};
use logbridge_discovery::DiscoveryPublisher;
use logbridge_logs::{ensure_session, RotationConfig, SessionLog, SessionPaths};
use logbridge_web::{bind_with_fallback, serve, AppState};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Main daemon struct
pub struct Daemon {
    listener: TcpListener,
    state: AppState,
    publisher: Arc<DiscoveryPublisher>,
    session: Option<SessionPaths>,
    url: String,
}

/// Address producers should use; a wildcard bind is advertised as loopback
fn advertised_url(addr: SocketAddr) -> String {
    let ip = if addr.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.ip()
    };
    format!("http://{}", SocketAddr::new(ip, addr.port()))
}

impl Daemon {
    /// Bind, open the durable session and publish the discovery record
    pub async fn new(config: ConfigFile, cwd: PathBuf) -> Result<Self> {
        let aggregator = &config.aggregator;

        let listener = bind_with_fallback(&aggregator.host, aggregator.port).await?;
        let url = advertised_url(listener.local_addr()?);

        let (durable, session) = if config.store.enabled {
            let base = cwd.join(&config.store.dir);
            let paths = ensure_session(&base, config.store.mode)?;
            info!("Durable session log at {}", paths.file.display());

            let rotation = RotationConfig::new(config.store.max_size_bytes, config.store.max_files);
            let log = SessionLog::new(paths.file.clone(), rotation);
            (Some(Arc::new(log)), Some(paths))
        } else {
            (None, None)
        };

        let state = AppState::new(RingBuffer::new(aggregator.capacity))
            .with_durable(durable)
            .with_token(aggregator.token.clone());

        let mut record = DiscoveryRecord::new(&url, std::process::id());
        record.project = aggregator.project.clone();
        record.token = aggregator.token.clone();

        let legacy = aggregator
            .legacy_discovery
            .then(constants::legacy_discovery_path);
        let publisher = DiscoveryPublisher::new(record, &cwd).with_legacy(legacy);
        publisher.publish()?;
        info!("Discovery record written to {}", publisher.path().display());

        Ok(Self {
            listener,
            state,
            publisher: Arc::new(publisher),
            session,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session(&self) -> Option<&SessionPaths> {
        self.session.as_ref()
    }

    pub fn discovery_path(&self) -> PathBuf {
        self.publisher.path().to_path_buf()
    }

    /// Serve until `shutdown` resolves, keeping the discovery record fresh.
    /// The record is removed on return.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        // Rewrite the record well inside the staleness window
        let publisher = Arc::clone(&self.publisher);
        let heartbeat = tokio::spawn(async move {
            let interval = Duration::from_secs(constants::DISCOVERY_HEARTBEAT_SECS);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = publisher.publish() {
                            warn!("Failed to refresh discovery record: {}", e);
                        }
                    }
                }
            }
        });

        info!("Aggregator running at {}", self.url);
        let result = serve(self.listener, self.state, shutdown).await;

        let _ = shutdown_tx.send(());
        let _ = heartbeat.await;
        self.publisher.cleanup();

        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbridge_core::SessionMode;
    use tempfile::TempDir;

    fn test_config() -> ConfigFile {
        let mut config = ConfigFile::default();
        config.aggregator.port = 0;
        config.aggregator.legacy_discovery = false;
        config.store.mode = SessionMode::Single;
        config
    }

    #[test]
    fn test_advertised_url() {
        let wildcard: SocketAddr = "0.0.0.0:7357".parse().unwrap();
        assert_eq!(advertised_url(wildcard), "http://127.0.0.1:7357");

        let loopback: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(advertised_url(loopback), "http://127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_daemon_publishes_serves_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(test_config(), dir.path().to_path_buf())
            .await
            .unwrap();

        let discovery = daemon.discovery_path();
        let record = logbridge_discovery::read_record(&discovery).unwrap();
        assert_eq!(record.url, daemon.url());
        assert_eq!(record.pid, std::process::id());

        let session = daemon.session().unwrap().clone();
        assert!(session.file.exists());
        assert_eq!(session.relative, "sessions/single");

        let url = daemon.url().to_string();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(daemon.run(async {
            let _ = stop_rx.await;
        }));

        let client = reqwest::Client::new();
        let health = client
            .get(format!("{}{}", url, constants::HEALTH_ROUTE))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status().as_u16(), 204);

        let ingest = client
            .post(format!("{}{}", url, constants::INGEST_ROUTE))
            .header("content-type", "application/json")
            .body(r#"{"sessionId":"aaaa1111","entries":[{"level":"warn","text":"kept"}]}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(ingest.status().as_u16(), 204);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert!(!discovery.exists());
        let content = std::fs::read_to_string(&session.file).unwrap();
        assert!(content.contains("\"message\":\"kept\""));
    }
}
