//! # Brokerguard HTTP sidecar
//!
//! Serves ACL decisions to brokers that cannot embed the library.
//!
//! ## Endpoints
//!
//! - `POST /v1/authorize` - Authorize a batch of actions for a principal
//! - `POST /v1/authenticate` - Check a username and password
//! - `GET /health` - Snapshot generations and refresh statistics
//!
//! ## Configuration
//!
//! Environment variables:
//! - `BROKERGUARD_CONFIG` - Path to the TOML configuration (default: /etc/brokerguard/authz.toml)
//! - `PORT` - HTTP server port (default: 8080)
//! - `RUST_LOG` - Log level (default: info)

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use brokerguard_authz::{
    refresh::RefreshStats, AclEngine, Action, AuthorizationResult, AuthzConfig, AuthzError,
    Operation, PatternType, ResourcePattern, ResourceType,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_PATH: &str = "/etc/brokerguard/authz.toml";

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<AclEngine>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::UnsupportedPatternType(_) => AppError::BadRequest(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// One action as sent by the broker
#[derive(Debug, Deserialize)]
struct ActionBody {
    resource_type: String,
    resource_name: String,
    #[serde(default)]
    pattern_type: Option<String>,
    operation: String,
}

impl ActionBody {
    fn parse(&self) -> Result<Action, AppError> {
        let resource_type = ResourceType::parse(&self.resource_type).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown resource type: {}", self.resource_type))
        })?;
        let operation = Operation::parse(&self.operation)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown operation: {}", self.operation)))?;
        let pattern_type = match &self.pattern_type {
            Some(raw) => PatternType::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown pattern type: {}", raw)))?,
            None => PatternType::Literal,
        };

        Ok(Action::new(
            ResourcePattern {
                resource_type,
                name: self.resource_name.clone(),
                pattern_type,
            },
            operation,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizeRequest {
    principal: String,
    actions: Vec<ActionBody>,
}

#[derive(Debug, Serialize)]
struct AuthorizeResponse {
    results: Vec<AuthorizationResult>,
}

#[derive(Debug, Deserialize)]
struct AuthenticateRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthenticateResponse {
    authenticated: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
    rules_generation: u64,
    rules: usize,
    credentials_generation: u64,
    credentials: usize,
    refresh: RefreshStats,
}

/// POST /v1/authorize - Authorize a batch of actions
async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    let actions = req
        .actions
        .iter()
        .map(ActionBody::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let results = state.engine.authorize(&req.principal, &actions)?;
    Ok(Json(AuthorizeResponse { results }))
}

/// POST /v1/authenticate - Check a username and password
async fn authenticate(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateRequest>,
) -> Json<AuthenticateResponse> {
    let result = state
        .engine
        .authenticate(&req.username, req.password.as_bytes());
    info!("Authentication for {}: {:?}", req.username, result);

    Json(AuthenticateResponse {
        authenticated: result.is_authenticated(),
    })
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rules = state.engine.current_rules();
    let credentials = state.engine.current_credentials();
    let status = if rules.is_initialized() { "healthy" } else { "starting" };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: brokerguard_authz::VERSION.to_string(),
        rules_generation: rules.generation(),
        rules: rules.len(),
        credentials_generation: credentials.generation(),
        credentials: credentials.len(),
        refresh: state.engine.refresh_stats(),
    })
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/authorize", post(authorize))
        .route("/v1/authenticate", post(authenticate))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Brokerguard ACL server v{}", brokerguard_authz::VERSION);

    let config_path =
        std::env::var("BROKERGUARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    info!("Configuration:");
    info!("  Config file: {}", config_path);
    info!("  Port: {}", port);

    let config = AuthzConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    let engine = Arc::new(AclEngine::connect(&config).context("Engine initialization failed")?);
    engine.start();

    let state = AppState {
        engine: Arc::clone(&engine),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", addr))?;

    let result = serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    engine.stop().await;

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
