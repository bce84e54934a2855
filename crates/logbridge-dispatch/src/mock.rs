//! Mock implementations for testing

use crate::sink::LocalSink;
use crate::transport::Transport;
use async_trait::async_trait;
use logbridge_core::{render_entry, AggregatorEndpoint, Batch, Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A mock transport that records forwards and can be flipped offline
pub struct MockTransport {
    forwarded: Mutex<Vec<(String, Batch)>>,
    forward_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    reachable: AtomicBool,
    speaks_protocol: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            forwarded: Mutex::new(Vec::new()),
            forward_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            reachable: AtomicBool::new(true),
            speaks_protocol: AtomicBool::new(true),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport where every request fails
    pub fn unreachable() -> Self {
        let transport = Self::default();
        transport.set_reachable(false);
        transport
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_speaks_protocol(&self, speaks: bool) {
        self.speaks_protocol.store(speaks, Ordering::SeqCst);
    }

    pub fn forward_calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Successfully forwarded batches with the ingest URL they went to
    pub fn forwarded(&self) -> Vec<(String, Batch)> {
        self.forwarded.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn forward(&self, endpoint: &AggregatorEndpoint, batch: &Batch) -> Result<()> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::AggregatorUnreachable("mock offline".to_string()));
        }

        self.forwarded
            .lock()
            .push((endpoint.ingest_url(), batch.clone()));
        Ok(())
    }

    async fn probe(&self, _endpoint: &AggregatorEndpoint) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn verify(&self, _endpoint: &AggregatorEndpoint) -> bool {
        self.reachable.load(Ordering::SeqCst) && self.speaks_protocol.load(Ordering::SeqCst)
    }
}

/// A sink that keeps rendered lines in memory
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl LocalSink for MemorySink {
    fn print(&self, batch: &Batch) {
        let mut lines = self.lines.lock();
        lines.extend(batch.entries.iter().map(render_entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbridge_core::{Entry, Level};

    fn batch() -> Batch {
        Batch::new("aaaa1111", vec![Entry::new("aaaa1111", Level::Error, "boom")])
    }

    #[tokio::test]
    async fn test_mock_transport_records_forwards() {
        let transport = MockTransport::new();
        let endpoint = AggregatorEndpoint::from_url("http://127.0.0.1:1");

        transport.forward(&endpoint, &batch()).await.unwrap();

        assert_eq!(transport.forward_calls(), 1);
        assert_eq!(transport.forwarded()[0].0, "http://127.0.0.1:1/__logbridge/ingest");
    }

    #[tokio::test]
    async fn test_mock_transport_fails_when_offline() {
        let transport = MockTransport::unreachable();
        let endpoint = AggregatorEndpoint::from_url("http://127.0.0.1:1");

        assert!(transport.forward(&endpoint, &batch()).await.is_err());
        assert!(!transport.probe(&endpoint).await);
        assert!(transport.forwarded().is_empty());
    }

    #[test]
    fn test_memory_sink_renders() {
        let sink = MemorySink::new();
        sink.print(&batch());
        assert!(sink.contains("ERROR: boom"));
    }
}
