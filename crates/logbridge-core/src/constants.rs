//! Constants and default values for logbridge

use std::path::PathBuf;

/// Protocol identifier advertised by the capabilities endpoint
pub const PROTOCOL_NAME: &str = "logbridge";

/// Protocol version advertised by the capabilities endpoint
pub const PROTOCOL_VERSION: u32 = 1;

/// Discovery record file name, written to the aggregator's working directory
pub const DISCOVERY_FILE: &str = ".logbridge.json";

/// Legacy discovery record file name, written to the shared temp directory
pub const LEGACY_DISCOVERY_FILE: &str = "logbridge-discovery.json";

/// Durable store sessions directory name
pub const SESSIONS_DIR: &str = "sessions";

/// Durable store pointer file naming the active session
pub const CURRENT_FILE: &str = "current";

/// Session folder name used in single-session mode
pub const SINGLE_SESSION: &str = "single";

/// Log file name inside each session folder
pub const SESSION_LOG_FILE: &str = "logs.jsonl";

/// Default durable store directory name (relative to the working directory)
pub const STORE_DIR: &str = ".logbridge";

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "logbridge.toml",
    "logbridge.yaml",
    "logbridge.yml",
    "logbridge.json",
];

/// Header carrying the optional ingestion token
pub const TOKEN_HEADER: &str = "X-Logbridge-Token";

/// Ingestion route (POST batch)
pub const INGEST_ROUTE: &str = "/__logbridge/ingest";

/// Liveness route (GET, no body)
pub const HEALTH_ROUTE: &str = "/__logbridge/health";

/// Protocol capability route (GET, JSON)
pub const CAPABILITIES_ROUTE: &str = "/__logbridge/capabilities";

/// Human-readable diagnostics route (GET, text)
pub const TEXT_ROUTE: &str = "/__logbridge/logs";

/// JSON snapshot route (GET)
pub const ENTRIES_ROUTE: &str = "/__logbridge/entries";

/// Buffer clear route (POST)
pub const CLEAR_ROUTE: &str = "/__logbridge/clear";

/// Buffer capacity route (POST)
pub const CAPACITY_ROUTE: &str = "/__logbridge/capacity";

/// Buffer stats route (GET)
pub const STATS_ROUTE: &str = "/__logbridge/stats";

/// Durable session read route (GET)
pub const SESSION_ROUTE: &str = "/__logbridge/session";

/// How often the aggregator rewrites its discovery record (seconds)
pub const DISCOVERY_HEARTBEAT_SECS: u64 = 20;

/// Environment variable holding an explicit aggregator address
pub const ENV_URL: &str = "LOGBRIDGE_URL";

/// Environment variable overriding the preferred aggregator port
pub const ENV_PORT: &str = "LOGBRIDGE_PORT";

/// Environment variable holding the ingestion token
pub const ENV_TOKEN: &str = "LOGBRIDGE_TOKEN";

/// Default host the aggregator binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Preferred aggregator port; an ephemeral port is used if it is taken
pub const DEFAULT_PORT: u16 = 7357;

/// Default ring buffer capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Smallest ring buffer capacity accepted
pub const MIN_CAPACITY: usize = 50;

/// Discovery records older than this are stale (seconds)
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60;

/// Background probe interval in milliseconds
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 1500;

/// Liveness probe timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 400;

/// Forwarding timeout in milliseconds
pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 500;

/// Pending batches a producer queues before printing locally instead
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Maximum JSONL message size in bytes
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Marker appended to truncated messages
pub const ELLIPSIS: &str = "…";

/// Default durable log max size in bytes (10MB)
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default rotated durable logs to keep
pub const DEFAULT_LOG_MAX_FILES: usize = 5;

/// Session id used when a batch carries none
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Significant prefix length of a session id
pub const SESSION_PREFIX_LEN: usize = 8;

/// Well-known address the background probe tries when nothing was discovered
pub fn fallback_url() -> String {
    format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT)
}

/// Legacy discovery record path in the shared temp directory
pub fn legacy_discovery_path() -> PathBuf {
    std::env::temp_dir().join(LEGACY_DISCOVERY_FILE)
}

/// Per-user config directory searched after the working directory
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("logbridge"))
}
