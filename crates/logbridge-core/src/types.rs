//! Core types for logbridge

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The significant prefix of a session id (first 8 characters)
pub fn session_prefix(id: &str) -> &str {
    match id.char_indices().nth(SESSION_PREFIX_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Severity of a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Level {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    /// Normalize a level name. Legacy aliases map onto their canonical level
    /// and anything unrecognized becomes `Log`.
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" | "err" | "fatal" => Level::Error,
            "debug" | "verbose" | "trace" => Level::Debug,
            _ => Level::Log,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Log => "log",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
        }
    }

    /// Upper-case label used in rendered lines
    pub fn label(&self) -> &'static str {
        match self {
            Level::Log => "LOG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
        }
    }

    /// Parse a comma-separated level list (e.g. "warn,error")
    pub fn parse_list(s: &str) -> Vec<Level> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Level::normalize)
            .collect()
    }
}

impl From<String> for Level {
    fn from(s: String) -> Self {
        Level::normalize(&s)
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Level::normalize(s))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One diagnostic event. Entries are never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub session_id: String,
    pub level: Level,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl Entry {
    pub fn new(session_id: impl Into<String>, level: Level, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            level,
            text: text.into(),
            time: None,
            source: None,
            stack: None,
            tag: None,
            project: None,
        }
    }

    pub fn at(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn session_prefix(&self) -> &str {
        session_prefix(&self.session_id)
    }
}

/// Entry as received on the wire, before validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub session_id: Option<String>,
    pub level: Option<String>,
    pub text: Option<String>,
    pub time: Option<f64>,
    pub source: Option<String>,
    pub stack: Option<String>,
    pub tag: Option<String>,
    pub project: Option<String>,
}

/// Batch as received on the wire, before validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBatch {
    pub session_id: Option<String>,
    pub entries: Option<Vec<RawEntry>>,
}

/// A validated batch of entries from one producer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub entries: Vec<Entry>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl Batch {
    pub fn new(session_id: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            entries,
        }
    }

    /// Parse and validate a JSON batch payload
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: RawBatch = serde_json::from_str(payload)
            .map_err(|e| Error::invalid_batch(format!("malformed payload: {}", e)))?;
        Self::validate(raw)
    }

    /// Validate and normalize a raw batch. A single bad entry rejects the batch.
    pub fn validate(raw: RawBatch) -> Result<Self> {
        let session_id = non_empty(raw.session_id);
        let raw_entries = raw
            .entries
            .ok_or_else(|| Error::invalid_batch("missing entries array"))?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw_entry) in raw_entries.into_iter().enumerate() {
            let text = raw_entry
                .text
                .ok_or_else(|| Error::invalid_batch(format!("entry {} is missing text", index)))?;

            let session = non_empty(raw_entry.session_id)
                .or_else(|| session_id.clone())
                .unwrap_or_else(|| ANONYMOUS_SESSION.to_string());

            let time = match raw_entry.time {
                Some(t) if !t.is_finite() => {
                    return Err(Error::invalid_batch(format!(
                        "entry {} has a non-finite time",
                        index
                    )))
                }
                Some(t) => Some(t.round() as i64),
                None => None,
            };

            entries.push(Entry {
                session_id: session,
                level: raw_entry
                    .level
                    .as_deref()
                    .map(Level::normalize)
                    .unwrap_or(Level::Log),
                text,
                time,
                source: non_empty(raw_entry.source),
                stack: non_empty(raw_entry.stack),
                tag: non_empty(raw_entry.tag),
                project: non_empty(raw_entry.project),
            });
        }

        Ok(Self {
            session_id,
            entries,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Filtering scope for baselines and hard clears
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Global,
    Session(String),
    Project(String),
}

impl Scope {
    /// Baseline map key for this scope
    pub fn key(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Session(id) => format!("session:{}", session_prefix(id)),
            Scope::Project(name) => format!("project:{}", name),
        }
    }

    /// Check whether an entry falls under this scope
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Scope::Global => true,
            Scope::Session(id) => entry.session_prefix() == session_prefix(id),
            Scope::Project(name) => entry.project.as_deref() == Some(name.as_str()),
        }
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidScope("empty scope".to_string()));
        }
        if s == "global" {
            return Ok(Scope::Global);
        }
        if let Some(id) = s.strip_prefix("session:") {
            if id.is_empty() {
                return Err(Error::InvalidScope(s.to_string()));
            }
            return Ok(Scope::Session(id.to_string()));
        }
        if let Some(name) = s.strip_prefix("project:") {
            if name.is_empty() {
                return Err(Error::InvalidScope(s.to_string()));
            }
            return Ok(Scope::Project(name.to_string()));
        }
        // A bare id is a session
        Ok(Scope::Session(s.to_string()))
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.key()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// How a clear treats stored entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    /// Record a baseline cutoff, keep the data
    #[default]
    Soft,
    /// Delete matching entries and their baseline
    Hard,
}

/// Advertisement of a running aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub url: String,
    pub route: String,
    /// Milliseconds since the Unix epoch when the record was written
    pub timestamp: i64,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl DiscoveryRecord {
    pub fn new(url: impl Into<String>, pid: u32) -> Self {
        Self {
            url: url.into(),
            route: INGEST_ROUTE.to_string(),
            timestamp: now_ms(),
            pid,
            project: None,
            token: None,
        }
    }

    /// A record is fresh while its age is within the window
    pub fn is_fresh(&self, now_ms: i64, window: Duration) -> bool {
        let age = now_ms.saturating_sub(self.timestamp);
        age <= window.as_millis() as i64
    }

    pub fn endpoint(&self) -> AggregatorEndpoint {
        AggregatorEndpoint {
            base_url: self.url.trim_end_matches('/').to_string(),
            ingest_route: self.route.clone(),
            token: self.token.clone(),
        }
    }
}

/// Where to reach an aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorEndpoint {
    pub base_url: String,
    pub ingest_route: String,
    pub token: Option<String>,
}

impl AggregatorEndpoint {
    /// Endpoint from an operator-supplied base URL
    pub fn from_url(url: &str) -> Self {
        Self {
            base_url: url.trim().trim_end_matches('/').to_string(),
            ingest_route: INGEST_ROUTE.to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn ingest_url(&self) -> String {
        format!("{}{}", self.base_url, self.ingest_route)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, HEALTH_ROUTE)
    }

    pub fn capabilities_url(&self) -> String {
        format!("{}{}", self.base_url, CAPABILITIES_ROUTE)
    }

    pub fn text_url(&self) -> String {
        format!("{}{}", self.base_url, TEXT_ROUTE)
    }

    pub fn route_url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

impl fmt::Display for AggregatorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

/// Response body of the capabilities endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol: String,
    pub version: u32,
}

impl Capabilities {
    pub fn current() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.protocol == PROTOCOL_NAME && self.version == PROTOCOL_VERSION
    }
}

/// One line of the durable session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonlRow {
    pub timestamp: i64,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl JsonlRow {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            level,
            source: None,
            message: message.into(),
            meta: None,
            session_id: None,
            project: None,
        }
    }

    /// Durable row for an ingested entry; stack and tag travel in `meta`
    pub fn from_entry(entry: &Entry) -> Self {
        let mut meta = serde_json::Map::new();
        if let Some(stack) = &entry.stack {
            meta.insert("stack".into(), serde_json::Value::String(stack.clone()));
        }
        if let Some(tag) = &entry.tag {
            meta.insert("tag".into(), serde_json::Value::String(tag.clone()));
        }

        Self {
            timestamp: entry.time.unwrap_or_else(now_ms),
            level: entry.level,
            source: entry.source.clone(),
            message: entry.text.clone(),
            meta: if meta.is_empty() {
                None
            } else {
                Some(serde_json::Value::Object(meta))
            },
            session_id: Some(entry.session_id.clone()),
            project: entry.project.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_normalize_aliases() {
        assert_eq!(Level::normalize("warning"), Level::Warn);
        assert_eq!(Level::normalize("verbose"), Level::Debug);
        assert_eq!(Level::normalize("ERROR"), Level::Error);
        assert_eq!(Level::normalize("shout"), Level::Log);
    }

    #[test]
    fn test_level_deserialize_normalizes() {
        let level: Level = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(level, Level::Warn);
        assert_eq!(serde_json::to_string(&Level::Warn).unwrap(), "\"warn\"");
    }

    #[test]
    fn test_session_prefix() {
        assert_eq!(session_prefix("aaaa1111bbbb"), "aaaa1111");
        assert_eq!(session_prefix("short"), "short");
        assert_eq!(session_prefix("ééééééééé"), "éééééééé");
    }

    #[test]
    fn test_batch_from_json() {
        let batch = Batch::from_json(
            r#"{"sessionId":"aaaa1111","entries":[{"level":"error","text":"boom"},{"level":"verbose","text":"x","sessionId":"bbbb2222","time":12.6}]}"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entries[0].session_id, "aaaa1111");
        assert_eq!(batch.entries[0].level, Level::Error);
        assert_eq!(batch.entries[1].session_id, "bbbb2222");
        assert_eq!(batch.entries[1].level, Level::Debug);
        assert_eq!(batch.entries[1].time, Some(13));
    }

    #[test]
    fn test_batch_defaults() {
        let batch = Batch::from_json(r#"{"entries":[{"text":"hi"}]}"#).unwrap();
        assert_eq!(batch.entries[0].session_id, ANONYMOUS_SESSION);
        assert_eq!(batch.entries[0].level, Level::Log);
    }

    #[test]
    fn test_batch_rejects_malformed() {
        assert!(Batch::from_json("not json").is_err());
        assert!(Batch::from_json(r#"{"sessionId":"a"}"#).is_err());
        assert!(Batch::from_json(r#"{"entries":{"text":"x"}}"#).is_err());
        assert!(Batch::from_json(r#"{"entries":[{"level":"info"}]}"#).is_err());
        assert!(Batch::from_json(r#"{"entries":[{"text":5}]}"#).is_err());
    }

    #[test]
    fn test_batch_serializes_to_wire_shape() {
        let batch = Batch::new("aaaa1111", vec![Entry::new("aaaa1111", Level::Error, "boom")]);
        let json = serde_json::to_string(&batch).unwrap();
        let parsed = Batch::from_json(&json).unwrap();
        assert_eq!(parsed, batch);
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!(
            "session:abc".parse::<Scope>().unwrap(),
            Scope::Session("abc".to_string())
        );
        assert_eq!(
            "project:web".parse::<Scope>().unwrap(),
            Scope::Project("web".to_string())
        );
        assert_eq!(
            "aaaa1111".parse::<Scope>().unwrap(),
            Scope::Session("aaaa1111".to_string())
        );
        assert!("".parse::<Scope>().is_err());
        assert!("project:".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_key_uses_prefix() {
        let scope = Scope::Session("aaaa1111-extra".to_string());
        assert_eq!(scope.key(), "session:aaaa1111");
        assert!(scope.matches(&Entry::new("aaaa1111-other", Level::Log, "x")));
        assert!(!scope.matches(&Entry::new("bbbb1111", Level::Log, "x")));
    }

    #[test]
    fn test_discovery_record_freshness() {
        let mut record = DiscoveryRecord::new("http://127.0.0.1:7357/", 42);
        let now = record.timestamp;
        assert!(record.is_fresh(now + 1_000, Duration::from_secs(60)));
        record.timestamp = now - 61_000;
        assert!(!record.is_fresh(now, Duration::from_secs(60)));
        assert_eq!(
            record.endpoint().ingest_url(),
            "http://127.0.0.1:7357/__logbridge/ingest"
        );
    }

    #[test]
    fn test_jsonl_row_from_entry() {
        let entry = Entry::new("aaaa1111", Level::Warn, "careful")
            .at(5)
            .with_tag("[web]")
            .with_project("shop");
        let row = JsonlRow::from_entry(&entry);
        assert_eq!(row.timestamp, 5);
        assert_eq!(row.project.as_deref(), Some("shop"));
        assert_eq!(row.meta.unwrap()["tag"], "[web]");

        let line = serde_json::to_string(&JsonlRow::new(Level::Info, "x")).unwrap();
        assert!(line.contains("\"message\":\"x\""));
        assert!(!line.contains("sessionId"));
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoint = AggregatorEndpoint::from_url(" http://127.0.0.1:7357/ ");
        assert_eq!(endpoint.base_url, "http://127.0.0.1:7357");
        assert_eq!(endpoint.ingest_url(), "http://127.0.0.1:7357/__logbridge/ingest");
        assert_eq!(endpoint.health_url(), "http://127.0.0.1:7357/__logbridge/health");
        assert_eq!(endpoint.text_url(), "http://127.0.0.1:7357/__logbridge/logs");
    }
}
