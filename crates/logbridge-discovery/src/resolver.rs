//! Producer-side aggregator resolution

use logbridge_core::{
    constants, legacy_discovery_path, now_ms, AggregatorEndpoint, DiscoveryRecord,
    ProducerConfig,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::process::is_process_alive;
use crate::publisher::read_record;

/// Where a resolved address came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveSource {
    /// Operator-provided address
    Explicit,
    /// Discovery record found walking up from the working directory
    File(PathBuf),
    /// Shared temp-dir discovery record
    Legacy(PathBuf),
    /// Fallback address confirmed by the background probe
    Probe,
}

impl fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveSource::Explicit => write!(f, "explicit"),
            ResolveSource::File(path) => write!(f, "file {}", path.display()),
            ResolveSource::Legacy(path) => write!(f, "legacy file {}", path.display()),
            ResolveSource::Probe => write!(f, "probe"),
        }
    }
}

/// A candidate aggregator address
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub endpoint: AggregatorEndpoint,
    pub source: ResolveSource,
    pub record: Option<DiscoveryRecord>,
}

impl Resolved {
    pub fn is_explicit(&self) -> bool {
        self.source == ResolveSource::Explicit
    }
}

/// Locates a running aggregator
#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    explicit: Option<AggregatorEndpoint>,
    start_dir: PathBuf,
    stale_after: Duration,
    legacy: Option<PathBuf>,
}

impl DiscoveryResolver {
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            explicit: None,
            start_dir: start_dir.into(),
            stale_after: Duration::from_secs(constants::DEFAULT_STALE_AFTER_SECS),
            legacy: None,
        }
    }

    /// Resolver configured from the producer settings
    pub fn from_config(config: &ProducerConfig, start_dir: impl Into<PathBuf>, token: Option<String>) -> Self {
        let explicit = config
            .url
            .as_deref()
            .map(|url| AggregatorEndpoint::from_url(url).with_token(token));

        Self {
            explicit,
            start_dir: start_dir.into(),
            stale_after: config.stale_after(),
            legacy: config.legacy_discovery.then(legacy_discovery_path),
        }
    }

    pub fn with_explicit(mut self, endpoint: Option<AggregatorEndpoint>) -> Self {
        self.explicit = endpoint;
        self
    }

    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.stale_after = window;
        self
    }

    pub fn with_legacy(mut self, path: Option<PathBuf>) -> Self {
        self.legacy = path;
        self
    }

    /// Resolve in priority order: explicit address, the nearest valid record
    /// from the start directory upwards, then the legacy record.
    pub fn resolve(&self) -> Option<Resolved> {
        if let Some(endpoint) = &self.explicit {
            return Some(Resolved {
                endpoint: endpoint.clone(),
                source: ResolveSource::Explicit,
                record: None,
            });
        }

        self.resolve_files()
    }

    /// Resolve from discovery records only, ignoring any explicit address
    pub fn resolve_files(&self) -> Option<Resolved> {
        for dir in self.start_dir.ancestors() {
            let path = dir.join(constants::DISCOVERY_FILE);
            if let Some(record) = self.valid_record(&path) {
                return Some(Resolved {
                    endpoint: record.endpoint(),
                    source: ResolveSource::File(path),
                    record: Some(record),
                });
            }
        }

        let legacy = self.legacy.as_ref()?;
        let record = self.valid_record(legacy)?;
        Some(Resolved {
            endpoint: record.endpoint(),
            source: ResolveSource::Legacy(legacy.clone()),
            record: Some(record),
        })
    }

    fn valid_record(&self, path: &Path) -> Option<DiscoveryRecord> {
        let record = read_record(path)?;
        if self.is_valid(&record) {
            Some(record)
        } else {
            debug!(
                "Ignoring stale discovery record {} (pid {})",
                path.display(),
                record.pid
            );
            None
        }
    }

    /// A record is usable while it is fresh and its process is alive
    pub fn is_valid(&self, record: &DiscoveryRecord) -> bool {
        record.is_fresh(now_ms(), self.stale_after) && is_process_alive(record.pid)
    }
}
