//! Forward-or-print decision per batch

use logbridge_core::{AggregatorEndpoint, Batch, EchoPolicy, ProducerConfig};
use logbridge_discovery::{DiscoveryResolver, ResolveSource, Resolved};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::availability::{Availability, AvailabilityTracker};
use crate::sink::{LocalSink, StderrSink};
use crate::transport::{HttpTransport, Transport};

/// What happened to one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub forwarded: bool,
    pub printed: bool,
}

#[derive(Debug, Default)]
struct DispatchState {
    tracker: AvailabilityTracker,
    resolved: Option<Resolved>,
    resolve_attempted: bool,
}

/// Decides per batch whether to forward to the aggregator, print locally, or both.
///
/// Network failures never surface to the caller; they demote availability and
/// the batch is printed instead.
pub struct FailoverDispatcher {
    resolver: DiscoveryResolver,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn LocalSink>,
    echo: EchoPolicy,
    fallback: Option<AggregatorEndpoint>,
    probe_interval: Duration,
    state: Mutex<DispatchState>,
}

impl FailoverDispatcher {
    pub fn new(
        resolver: DiscoveryResolver,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn LocalSink>,
    ) -> Self {
        Self {
            resolver,
            transport,
            sink,
            echo: EchoPolicy::default(),
            fallback: None,
            probe_interval: ProducerConfig::default().probe_interval(),
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// Dispatcher with HTTP transport and stderr printing
    pub fn from_config(
        config: &ProducerConfig,
        start_dir: impl Into<PathBuf>,
        token: Option<String>,
    ) -> Self {
        let resolver = DiscoveryResolver::from_config(config, start_dir, token.clone());
        let transport = HttpTransport::new(config.forward_timeout(), config.probe_timeout());
        let fallback = AggregatorEndpoint::from_url(&config.fallback_url()).with_token(token);

        Self::new(resolver, Arc::new(transport), Arc::new(StderrSink::new()))
            .with_echo(config.echo)
            .with_fallback(Some(fallback))
            .with_probe_interval(config.probe_interval())
    }

    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Well-known address the background probe tries while unresolved
    pub fn with_fallback(mut self, endpoint: Option<AggregatorEndpoint>) -> Self {
        self.fallback = endpoint;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn availability(&self) -> Availability {
        self.state.lock().tracker.current()
    }

    pub fn resolved(&self) -> Option<Resolved> {
        self.state.lock().resolved.clone()
    }

    /// Print a batch locally without trying to forward it
    pub fn print_local(&self, batch: &Batch) {
        self.sink.print(batch);
    }

    /// Current target, resolving on first need. A freshly resolved address is
    /// assumed available until a forward or probe says otherwise.
    fn target(&self) -> Option<(Resolved, Availability)> {
        let mut state = self.state.lock();

        if state.resolved.is_none() && !state.resolve_attempted {
            state.resolve_attempted = true;
            match self.resolver.resolve() {
                Some(resolved) => {
                    debug!("Resolved aggregator {} via {}", resolved.endpoint, resolved.source);
                    state.tracker.set(Availability::Available, &resolved.endpoint.base_url);
                    state.resolved = Some(resolved);
                }
                None => debug!("No aggregator found, printing locally"),
            }
        }

        let availability = state.tracker.current();
        state.resolved.clone().map(|r| (r, availability))
    }

    /// Record an observation about `endpoint`, ignored if the target moved meanwhile
    fn mark(&self, endpoint: &AggregatorEndpoint, availability: Availability) {
        let mut state = self.state.lock();
        let current = state.resolved.as_ref().map(|r| &r.endpoint);
        if current == Some(endpoint) {
            state.tracker.set(availability, &endpoint.base_url);
        }
    }

    fn adopt(&self, resolved: Resolved, availability: Availability) {
        let mut state = self.state.lock();
        info!("Using aggregator {} via {}", resolved.endpoint, resolved.source);
        state.tracker.set(availability, &resolved.endpoint.base_url);
        state.resolved = Some(resolved);
        state.resolve_attempted = true;
    }

    fn should_print(&self, forwarded: bool, explicit: bool) -> bool {
        match self.echo {
            EchoPolicy::Always => true,
            EchoPolicy::Never => !forwarded,
            EchoPolicy::Auto => !(forwarded && explicit),
        }
    }

    /// Forward and/or print one batch
    pub async fn dispatch(&self, batch: &Batch) -> DispatchOutcome {
        if batch.is_empty() {
            return DispatchOutcome::default();
        }

        let mut forwarded = false;
        let mut explicit = false;

        if let Some((resolved, availability)) = self.target() {
            explicit = resolved.is_explicit();
            if availability.is_available() {
                match self.transport.forward(&resolved.endpoint, batch).await {
                    Ok(()) => forwarded = true,
                    Err(e) => {
                        debug!("Forward to {} failed: {}", resolved.endpoint, e);
                        self.mark(&resolved.endpoint, Availability::Unavailable);
                    }
                }
            }
        }

        let printed = self.should_print(forwarded, explicit);
        if printed {
            self.sink.print(batch);
        }

        DispatchOutcome { forwarded, printed }
    }

    /// One monitor step: probe the known address, or look for one
    pub async fn tick(&self) {
        let known = self.state.lock().resolved.clone();
        match known {
            Some(resolved) => self.check_known(resolved).await,
            None => self.search().await,
        }
    }

    async fn check_known(&self, resolved: Resolved) {
        if self.transport.probe(&resolved.endpoint).await {
            self.mark(&resolved.endpoint, Availability::Available);
            return;
        }
        self.mark(&resolved.endpoint, Availability::Unavailable);

        // A discovered aggregator may have restarted on another address
        if resolved.is_explicit() {
            return;
        }
        if let Some(found) = self.resolver.resolve_files() {
            if found.endpoint != resolved.endpoint && self.transport.probe(&found.endpoint).await {
                self.adopt(found, Availability::Available);
            }
        }
    }

    async fn search(&self) {
        self.state.lock().resolve_attempted = true;

        if let Some(found) = self.resolver.resolve() {
            let availability = if self.transport.probe(&found.endpoint).await {
                Availability::Available
            } else {
                Availability::Unavailable
            };
            self.adopt(found, availability);
            return;
        }

        let Some(fallback) = &self.fallback else {
            return;
        };

        // Something listening is not enough; it has to speak the protocol
        if self.transport.probe(fallback).await && self.transport.verify(fallback).await {
            self.adopt(
                Resolved {
                    endpoint: fallback.clone(),
                    source: ResolveSource::Probe,
                    record: None,
                },
                Availability::Available,
            );
        }
    }

    /// Run [`tick`](Self::tick) every probe interval until shutdown
    pub fn spawn_monitor(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    _ = tokio::time::sleep(dispatcher.probe_interval) => {
                        dispatcher.tick().await;
                    }
                }
            }
            debug!("Availability monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemorySink, MockTransport};
    use logbridge_core::{constants, DiscoveryRecord, Entry, Level};
    use logbridge_discovery::write_record;
    use tempfile::TempDir;

    fn boom() -> Batch {
        Batch::new("aaaa1111", vec![Entry::new("aaaa1111", Level::Error, "boom")])
    }

    struct Harness {
        dir: TempDir,
        transport: Arc<MockTransport>,
        sink: Arc<MemorySink>,
    }

    impl Harness {
        fn new(transport: MockTransport) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                transport: Arc::new(transport),
                sink: Arc::new(MemorySink::new()),
            }
        }

        fn resolver(&self) -> DiscoveryResolver {
            DiscoveryResolver::new(self.dir.path()).with_legacy(None)
        }

        fn dispatcher(&self, resolver: DiscoveryResolver) -> FailoverDispatcher {
            FailoverDispatcher::new(resolver, self.transport.clone(), self.sink.clone())
        }

        fn explicit(&self) -> FailoverDispatcher {
            self.dispatcher(
                self.resolver()
                    .with_explicit(Some(AggregatorEndpoint::from_url("http://127.0.0.1:7357"))),
            )
        }

        fn publish(&self, url: &str) {
            write_record(
                &self.dir.path().join(constants::DISCOVERY_FILE),
                &DiscoveryRecord::new(url, std::process::id()),
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_no_aggregator_prints_locally() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.dispatcher(h.resolver());

        let outcome = dispatcher.dispatch(&boom()).await;

        assert_eq!(outcome, DispatchOutcome { forwarded: false, printed: true });
        assert!(h.sink.contains("ERROR: boom"));
        assert_eq!(h.transport.forward_calls(), 0);
        assert_eq!(dispatcher.availability(), Availability::Unresolved);
    }

    #[tokio::test]
    async fn test_explicit_forwards_without_echo() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.explicit();

        let outcome = dispatcher.dispatch(&boom()).await;

        assert_eq!(outcome, DispatchOutcome { forwarded: true, printed: false });
        assert_eq!(h.transport.forwarded().len(), 1);
        assert!(h.sink.lines().is_empty());
        assert_eq!(dispatcher.availability(), Availability::Available);
    }

    #[tokio::test]
    async fn test_discovered_forwards_and_prints() {
        let h = Harness::new(MockTransport::new());
        h.publish("http://127.0.0.1:9999");
        let dispatcher = h.dispatcher(h.resolver());

        let outcome = dispatcher.dispatch(&boom()).await;

        assert_eq!(outcome, DispatchOutcome { forwarded: true, printed: true });
        assert_eq!(
            h.transport.forwarded()[0].0,
            "http://127.0.0.1:9999/__logbridge/ingest"
        );
        assert!(matches!(
            dispatcher.resolved().unwrap().source,
            ResolveSource::File(_)
        ));
    }

    #[tokio::test]
    async fn test_echo_policies() {
        let h = Harness::new(MockTransport::new());
        h.publish("http://127.0.0.1:9999");

        let never = h.dispatcher(h.resolver()).with_echo(EchoPolicy::Never);
        assert!(!never.dispatch(&boom()).await.printed);

        let always = h.explicit().with_echo(EchoPolicy::Always);
        let outcome = always.dispatch(&boom()).await;
        assert!(outcome.forwarded && outcome.printed);
    }

    #[tokio::test]
    async fn test_failed_forward_demotes_until_probe_succeeds() {
        let h = Harness::new(MockTransport::unreachable());
        let dispatcher = h.explicit();

        let first = dispatcher.dispatch(&boom()).await;
        assert_eq!(first, DispatchOutcome { forwarded: false, printed: true });
        assert_eq!(dispatcher.availability(), Availability::Unavailable);
        assert_eq!(h.transport.forward_calls(), 1);

        // No forwarding attempts while unavailable
        let second = dispatcher.dispatch(&boom()).await;
        assert!(second.printed && !second.forwarded);
        assert_eq!(h.transport.forward_calls(), 1);

        h.transport.set_reachable(true);
        dispatcher.tick().await;
        assert_eq!(dispatcher.availability(), Availability::Available);

        let third = dispatcher.dispatch(&boom()).await;
        assert!(third.forwarded);
        assert_eq!(h.sink.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_probe_demotes() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.explicit();
        assert!(dispatcher.dispatch(&boom()).await.forwarded);

        h.transport.set_reachable(false);
        dispatcher.tick().await;
        assert_eq!(dispatcher.availability(), Availability::Unavailable);

        let outcome = dispatcher.dispatch(&boom()).await;
        assert!(outcome.printed && !outcome.forwarded);
        assert_eq!(h.transport.forward_calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_requires_protocol() {
        let h = Harness::new(MockTransport::new());
        h.transport.set_speaks_protocol(false);
        let dispatcher = h
            .dispatcher(h.resolver())
            .with_fallback(Some(AggregatorEndpoint::from_url("http://127.0.0.1:7357")));

        dispatcher.tick().await;
        assert_eq!(dispatcher.availability(), Availability::Unresolved);
        assert!(dispatcher.resolved().is_none());

        h.transport.set_speaks_protocol(true);
        dispatcher.tick().await;
        assert_eq!(dispatcher.availability(), Availability::Available);
        assert_eq!(dispatcher.resolved().unwrap().source, ResolveSource::Probe);
    }

    #[tokio::test]
    async fn test_tick_finds_late_record() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.dispatcher(h.resolver());

        assert!(!dispatcher.dispatch(&boom()).await.forwarded);

        h.publish("http://127.0.0.1:9999");
        dispatcher.tick().await;

        assert!(dispatcher.dispatch(&boom()).await.forwarded);
    }

    #[tokio::test]
    async fn test_preserves_batch_order() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.explicit();

        for i in 0..5 {
            let batch = Batch::new("s", vec![Entry::new("s", Level::Log, format!("{}", i))]);
            dispatcher.dispatch(&batch).await;
        }

        let texts: Vec<String> = h
            .transport
            .forwarded()
            .into_iter()
            .map(|(_, b)| b.entries[0].text.clone())
            .collect();
        assert_eq!(texts, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = h.explicit();
        let outcome = dispatcher.dispatch(&Batch::new("s", vec![])).await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(h.transport.forward_calls(), 0);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let h = Harness::new(MockTransport::new());
        let dispatcher = Arc::new(h.explicit().with_probe_interval(Duration::from_millis(10)));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = dispatcher.spawn_monitor(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
