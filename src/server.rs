//! HTTP API over the [`Assistant`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness, version, default provider |
//! | `GET`  | `/stats`  | Index statistics and ingestion state |
//! | `GET`  | `/models` | Configured models and their availability |
//! | `POST` | `/query`  | `{ "query", "provider"? }` → answer with sources |
//! | `POST` | `/ingest` | `{ "force_reindex"?, "path"? }` → starts a background run |
//! | `GET`  | `/config` | Effective configuration, API key redacted |
//! | `POST` | `/config/reload` | Re-read the config file; cached chains are dropped |
//!
//! `llm_type` and `force_reingest` are accepted as aliases of `provider` and
//! `force_reindex`.
//!
//! Ingestion runs on a spawned task so queries keep being served; a second
//! `POST /ingest` while one is running gets `409`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_argument", "message": "question must not be empty" } }
//! ```
//!
//! `invalid_argument`/`credential_missing` → 400, `path_not_found` → 404,
//! `ingest_in_progress` → 409, `provider_unavailable` → 503, everything
//! else → 500.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::assistant::{Assistant, ModelsInfo, QueryResult};
use crate::config::Config;
use crate::error::RagError;
use crate::gateway::GatewayStats;
use crate::ingest::IngestResult;
use crate::llm::ProviderKind;

#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
    ingesting: Arc<AtomicBool>,
    last_ingest: Arc<Mutex<Option<LastIngest>>>,
}

/// Outcome of the most recent background ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum LastIngest {
    Completed(IngestResult),
    Failed { code: String, message: String },
}

/// Build the router; exposed so tests can serve it on an ephemeral port.
pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = cors_layer(&assistant.config().server.cors_origins);
    let state = AppState {
        assistant,
        ingesting: Arc::new(AtomicBool::new(false)),
        last_ingest: Arc::new(Mutex::new(None)),
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/models", get(handle_models))
        .route("/query", post(handle_query))
        .route("/ingest", post(handle_ingest))
        .route("/config", get(handle_config))
        .route("/config/reload", post(handle_config_reload))
        .layer(cors)
        .with_state(state)
}

/// Serve on `server.bind` until the process is terminated.
pub async fn run_server(assistant: Arc<Assistant>) -> anyhow::Result<()> {
    let bind_addr = assistant.config().server.bind.clone();
    let app = router(assistant);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    eprintln!("tmw server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(values))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidArgument(_) | RagError::CredentialMissing(_) => {
                StatusCode::BAD_REQUEST
            }
            RagError::PathNotFound(_) => StatusCode::NOT_FOUND,
            RagError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Embedding(_)
            | RagError::StoreWrite(_)
            | RagError::Retrieval(_)
            | RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    llm_default: ProviderKind,
    vector_store_path: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.assistant.config();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        llm_default: config.llm.default,
        vector_store_path: config.paths.vector_store.display().to_string(),
    })
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    vector_store: GatewayStats,
    llm: LlmSummary,
    ingestion: IngestionState,
}

#[derive(Serialize)]
struct LlmSummary {
    default: ProviderKind,
    local_model: String,
    cloud_model: String,
}

#[derive(Serialize)]
struct IngestionState {
    running: bool,
    last: Option<LastIngest>,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let vector_store = state.assistant.stats().await?;
    let config = state.assistant.config();
    let last = state
        .last_ingest
        .lock()
        .map(|guard| guard.clone())
        .unwrap_or(None);

    Ok(Json(StatsResponse {
        vector_store,
        llm: LlmSummary {
            default: config.llm.default,
            local_model: config.llm.local.model.clone(),
            cloud_model: config.llm.cloud.model.clone(),
        },
        ingestion: IngestionState {
            running: state.ingesting.load(Ordering::SeqCst),
            last,
        },
    }))
}

// ============ GET /models ============

async fn handle_models(State(state): State<AppState>) -> Json<ModelsInfo> {
    Json(state.assistant.models().await)
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default, alias = "llm_type")]
    provider: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    let provider = req
        .provider
        .as_deref()
        .map(str::parse::<ProviderKind>)
        .transpose()?;
    let result = state.assistant.query(&req.query, provider).await?;
    Ok(Json(result))
}

// ============ POST /ingest ============

#[derive(Deserialize, Default)]
struct IngestRequest {
    #[serde(default, alias = "force_reingest")]
    force_reindex: bool,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct IngestAccepted {
    status: &'static str,
    message: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    body: Option<Json<IngestRequest>>,
) -> Result<(StatusCode, Json<IngestAccepted>), AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let root = req
        .path
        .unwrap_or_else(|| state.assistant.config().paths.docs_root.clone());
    if !root.is_dir() {
        return Err(RagError::PathNotFound(format!("not a directory: {}", root.display())).into());
    }

    if state
        .ingesting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(AppError {
            status: StatusCode::CONFLICT,
            code: "ingest_in_progress".to_string(),
            message: "an ingestion run is already in progress".to_string(),
        });
    }

    let message = format!(
        "Ingestion of {} started{}",
        root.display(),
        if req.force_reindex { " (full reindex)" } else { "" }
    );
    let force = req.force_reindex;
    let task_state = state.clone();
    tokio::spawn(async move {
        let _running = RunningFlag(Arc::clone(&task_state.ingesting));
        let outcome = match task_state.assistant.ingest(Some(&root), force).await {
            Ok(result) => {
                info!(message = %result.message, "background ingestion finished");
                LastIngest::Completed(result)
            }
            Err(e) => {
                error!(error = %e, "background ingestion failed");
                LastIngest::Failed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        };
        if let Ok(mut last) = task_state.last_ingest.lock() {
            *last = Some(outcome);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            status: "started",
            message,
        }),
    ))
}

/// Clears the ingestion flag when the run ends, panics included.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============ GET /config, POST /config/reload ============

#[derive(Serialize)]
struct ConfigView {
    source: Option<String>,
    cloud_credential_configured: bool,
    /// `llm.cloud.api_key` is never serialized.
    config: Config,
}

fn config_view(assistant: &Assistant, config: &Config) -> ConfigView {
    ConfigView {
        source: assistant.config_path().map(|p| p.display().to_string()),
        cloud_credential_configured: config.llm.cloud.credential().is_some(),
        config: config.clone(),
    }
}

async fn handle_config(State(state): State<AppState>) -> Json<ConfigView> {
    let config = state.assistant.config();
    Json(config_view(&state.assistant, &config))
}

async fn handle_config_reload(
    State(state): State<AppState>,
) -> Result<Json<ConfigView>, AppError> {
    let config = state.assistant.reload_config()?;
    Ok(Json(config_view(&state.assistant, &config)))
}
