//! Per-process producer context

use logbridge_core::{Batch, ConfigFile};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dispatcher::FailoverDispatcher;

/// Owns the dispatcher, its availability monitor and the submission queue.
///
/// Construct once per producer process (inside a tokio runtime) and pass it
/// to whatever captures entries.
pub struct ProducerContext {
    dispatcher: Arc<FailoverDispatcher>,
    queue: mpsc::Sender<Batch>,
    shutdown_tx: broadcast::Sender<()>,
    worker: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl ProducerContext {
    /// Start the worker and monitor tasks
    pub fn start(dispatcher: FailoverDispatcher, queue_depth: usize) -> Self {
        let dispatcher = Arc::new(dispatcher);
        let (queue, mut rx) = mpsc::channel::<Batch>(queue_depth.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        let monitor = dispatcher.spawn_monitor(shutdown_tx.subscribe());

        // One worker keeps batches in submission order
        let worker_dispatcher = Arc::clone(&dispatcher);
        let worker = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                worker_dispatcher.dispatch(&batch).await;
            }
            debug!("Dispatch worker drained");
        });

        Self {
            dispatcher,
            queue,
            shutdown_tx,
            worker,
            monitor,
        }
    }

    /// Context with HTTP transport and stderr printing from configuration
    pub fn from_config(config: &ConfigFile, start_dir: &Path) -> Self {
        let dispatcher = FailoverDispatcher::from_config(
            &config.producer,
            start_dir,
            config.aggregator.token.clone(),
        );
        Self::start(dispatcher, config.producer.queue_depth)
    }

    pub fn dispatcher(&self) -> &Arc<FailoverDispatcher> {
        &self.dispatcher
    }

    /// Queue a batch without waiting. If the queue is full the batch is
    /// printed locally right away. Returns whether it was queued.
    pub fn submit(&self, batch: Batch) -> bool {
        match self.queue.try_send(batch) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!("Dispatch queue full, printing {} entries locally", batch.len());
                self.dispatcher.print_local(&batch);
                false
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                self.dispatcher.print_local(&batch);
                false
            }
        }
    }

    /// Drain queued batches, then stop the monitor
    pub async fn shutdown(self) {
        let Self {
            queue,
            shutdown_tx,
            worker,
            monitor,
            ..
        } = self;

        drop(queue);
        if let Err(e) = worker.await {
            warn!("Dispatch worker failed: {}", e);
        }

        let _ = shutdown_tx.send(());
        if let Err(e) = monitor.await {
            warn!("Availability monitor failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::Availability;
    use crate::mock::{MemorySink, MockTransport};
    use crate::transport::HttpTransport;
    use logbridge_buffer::{RingBuffer, SnapshotQuery};
    use logbridge_core::{AggregatorEndpoint, Entry, Level};
    use logbridge_discovery::DiscoveryResolver;
    use logbridge_web::AppState;
    use std::time::Duration;
    use tempfile::TempDir;

    fn boom() -> Batch {
        Batch::from_json(r#"{"sessionId":"aaaa1111","entries":[{"level":"error","text":"boom"}]}"#)
            .unwrap()
    }

    async fn start_aggregator() -> (AppState, String) {
        let state = AppState::new(RingBuffer::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let serve_state = state.clone();
        tokio::spawn(async move {
            logbridge_web::serve(listener, serve_state, std::future::pending::<()>()).await
        });

        (state, url)
    }

    fn http_dispatcher(dir: &TempDir, url: &str, sink: Arc<MemorySink>) -> FailoverDispatcher {
        let resolver = DiscoveryResolver::new(dir.path())
            .with_legacy(None)
            .with_explicit(Some(AggregatorEndpoint::from_url(url)));
        let transport = HttpTransport::new(Duration::from_secs(2), Duration::from_millis(400));
        FailoverDispatcher::new(resolver, Arc::new(transport), sink)
            .with_probe_interval(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_forwards_to_running_aggregator() {
        let dir = TempDir::new().unwrap();
        let (state, url) = start_aggregator().await;
        let sink = Arc::new(MemorySink::new());

        let context = ProducerContext::start(http_dispatcher(&dir, &url, sink.clone()), 16);
        assert!(context.submit(boom()));
        context.shutdown().await;

        let entries = state.store.read().snapshot(&SnapshotQuery::session("aaaa1111"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "boom");
        // Explicit address and a successful forward: nothing printed
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_aggregator_prints_locally() {
        let dir = TempDir::new().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let sink = Arc::new(MemorySink::new());

        let context = ProducerContext::start(http_dispatcher(&dir, &url, sink.clone()), 16);
        context.submit(boom());
        context.submit(boom());
        let dispatcher = Arc::clone(context.dispatcher());
        context.shutdown().await;

        assert_eq!(dispatcher.availability(), Availability::Unavailable);
        assert_eq!(sink.lines().len(), 2);
        assert!(sink.contains("ERROR: boom"));
    }

    #[tokio::test]
    async fn test_submit_preserves_order() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let resolver = DiscoveryResolver::new(dir.path())
            .with_legacy(None)
            .with_explicit(Some(AggregatorEndpoint::from_url("http://127.0.0.1:1")));
        let dispatcher =
            FailoverDispatcher::new(resolver, transport.clone(), Arc::new(MemorySink::new()));

        let context = ProducerContext::start(dispatcher, 64);
        for i in 0..20 {
            context.submit(Batch::new("s", vec![Entry::new("s", Level::Log, i.to_string())]));
        }
        context.shutdown().await;

        let texts: Vec<String> = transport
            .forwarded()
            .into_iter()
            .map(|(_, b)| b.entries[0].text.clone())
            .collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(texts, expected);
    }
}
