//! logbridge Web - Aggregator HTTP surface
//!
//! Ingestion, liveness and capabilities endpoints for producers, plus text
//! and JSON views of the ring buffer and the durable session log.

mod handlers;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use logbridge_buffer::RingBuffer;
use logbridge_core::constants;
use logbridge_logs::SessionLog;
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use handlers::{ClearRequest, EntriesQuery, SessionPage};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Shared aggregator state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<RingBuffer>>,
    pub durable: Option<Arc<SessionLog>>,
    token: Option<String>,
}

impl AppState {
    pub fn new(buffer: RingBuffer) -> Self {
        Self {
            store: Arc::new(RwLock::new(buffer)),
            durable: None,
            token: None,
        }
    }

    /// Also append ingested entries to a durable session log
    pub fn with_durable(mut self, log: Option<Arc<SessionLog>>) -> Self {
        self.durable = log;
        self
    }

    /// Require this token on ingestion and mutation routes
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Token authentication middleware
async fn token_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // If no token is configured, allow all requests
    let Some(expected) = &state.token else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(constants::TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Create the aggregator router
pub fn create_router(state: AppState) -> Router {
    // Producers run in browsers on arbitrary dev-server origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // Routes that require the token when one is configured
    let protected_routes = Router::new()
        .route(constants::INGEST_ROUTE, post(handlers::ingest))
        .route(constants::CLEAR_ROUTE, post(handlers::clear))
        .route(constants::CAPACITY_ROUTE, post(handlers::capacity))
        .route_layer(middleware::from_fn_with_state(state.clone(), token_auth));

    let public_routes = Router::new()
        .route(constants::HEALTH_ROUTE, get(handlers::health))
        .route(constants::CAPABILITIES_ROUTE, get(handlers::capabilities))
        .route(constants::TEXT_ROUTE, get(handlers::text))
        .route(constants::ENTRIES_ROUTE, get(handlers::entries))
        .route(constants::STATS_ROUTE, get(handlers::stats))
        .route(constants::SESSION_ROUTE, get(handlers::session));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the preferred port, falling back to an ephemeral one if it is taken
pub async fn bind_with_fallback(host: &str, port: u16) -> std::io::Result<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            warn!("Port {} is in use, falling back to an ephemeral port", port);
            TcpListener::bind((host, 0)).await
        }
        Err(e) => Err(e),
    }
}

/// Serve the aggregator until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!("Starting logbridge aggregator on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
