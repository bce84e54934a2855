//! Command implementations

pub mod clear;
pub mod logs;
pub mod pipe;
pub mod rotate;
pub mod show;
pub mod status;

use anyhow::{bail, Context as _, Result};
use logbridge_core::{constants, AggregatorEndpoint, ConfigFile};
use logbridge_discovery::{DiscoveryResolver, Resolved};
use logbridge_logs::{current_session, SessionPaths};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// Configuration and working directory shared by every command
pub struct Context {
    pub config: ConfigFile,
    pub cwd: PathBuf,
}

impl Context {
    /// Load the config file and apply command-line overrides
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir()?;

        let mut config = match &cli.config {
            Some(path) => {
                let mut config = ConfigFile::load(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                config.apply_env_from(|key| std::env::var(key).ok())?;
                config
            }
            None => ConfigFile::discover(&cwd)?,
        };

        if let Some(url) = cli.url.clone().filter(|u| !u.trim().is_empty()) {
            config.producer.url = Some(url);
        }
        if cli.token.is_some() {
            config.aggregator.token = cli.token.clone();
        }

        Ok(Self { config, cwd })
    }

    pub fn resolver(&self) -> DiscoveryResolver {
        DiscoveryResolver::from_config(
            &self.config.producer,
            &self.cwd,
            self.config.aggregator.token.clone(),
        )
    }

    /// Resolve an aggregator, failing when none is configured or discoverable
    pub fn require_aggregator(&self) -> Result<Resolved> {
        match self.resolver().resolve() {
            Some(resolved) => Ok(resolved),
            None => bail!(
                "No running aggregator found (start logbridged or set {})",
                constants::ENV_URL
            ),
        }
    }

    /// Durable store base directory, relative paths anchored at the working directory
    pub fn store_base(&self, dir: Option<&Path>) -> PathBuf {
        let dir = dir.unwrap_or(&self.config.store.dir);
        self.cwd.join(dir)
    }

    /// Session the aggregator is currently writing
    pub fn require_session(&self, dir: Option<&Path>) -> Result<SessionPaths> {
        let base = self.store_base(dir);
        match current_session(&base)? {
            Some(paths) => Ok(paths),
            None => bail!("No session log found under {}", base.display()),
        }
    }
}

/// Attach the ingestion token, if any, to a request
pub fn authorize(
    request: reqwest::RequestBuilder,
    endpoint: &AggregatorEndpoint,
) -> reqwest::RequestBuilder {
    match &endpoint.token {
        Some(token) => request.header(constants::TOKEN_HEADER, token),
        None => request,
    }
}

/// Aggregator JSON response wrapper
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Unwrap an aggregator JSON envelope, surfacing its error message
pub async fn read_envelope<T>(response: reqwest::Response) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!("Aggregator rejected the token (set {})", constants::ENV_TOKEN);
    }

    let envelope: ApiEnvelope<T> = response
        .json()
        .await
        .with_context(|| format!("Unexpected response from aggregator ({})", status))?;

    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        _ => bail!(envelope
            .error
            .unwrap_or_else(|| format!("Aggregator returned {}", status))),
    }
}
