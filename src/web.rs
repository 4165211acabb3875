use crate::{
    config::Config,
    corpus::CorpusStats,
    semantic::{RankedResult, SearchEngine, SearchError},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct SharedState {
    pub engine: Arc<SearchEngine>,
    pub html_path: PathBuf,
    pub default_top_k: usize,
    pub default_threshold: f32,
}

impl SharedState {
    pub fn new(engine: Arc<SearchEngine>, config: &Config) -> Self {
        Self {
            engine,
            html_path: config.html_file(),
            default_top_k: config.search.default_top_k,
            default_threshold: config.search.default_threshold,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/search", post(search))
        .route("/stats", get(stats))
        .route("/whisper", get(whisper_page))
        .layer(CorsLayer::permissive())
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(state: SharedState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    log::info!("visit http://{addr}/whisper");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(state: SharedState, addr: SocketAddr) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(state, addr))
}

#[derive(Debug)]
struct HttpError(SearchError);

// Tell axum how to convert `SearchError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, detail) = match self.0 {
            SearchError::InvalidQuery(message) => (StatusCode::BAD_REQUEST, message),
            err @ (SearchError::Embedding(_) | SearchError::Index(_)) => {
                log::error!("search failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, Json(json!({"detail": detail}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<SearchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub quotes: usize,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        message: "Whisper API is running".to_string(),
        quotes: state.engine.corpus().size(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Number of results; the configured default when absent.
    /// Integral floats such as `3.0` are accepted.
    #[serde(default)]
    pub top_k: Option<serde_json::Number>,

    /// Minimum similarity; the configured default when absent
    #[serde(default)]
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RankedResult>,
    pub count: usize,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let top_k = match &payload.top_k {
        Some(top_k) => parse_top_k(top_k)?,
        None => state.default_top_k,
    };
    let threshold = payload.threshold.unwrap_or(state.default_threshold);

    let engine = state.engine.clone();

    tokio::task::block_in_place(move || {
        let results = engine.search(&payload.query, top_k, threshold)?;

        Ok(Json(SearchResponse {
            count: results.len(),
            query: payload.query,
            results,
        }))
    })
}

/// Accepts non-negative integers and integral floats. Zero is left for the
/// engine to reject.
fn parse_top_k(top_k: &serde_json::Number) -> Result<usize, SearchError> {
    let at_least_one = || SearchError::InvalidQuery("top_k must be at least 1".to_string());

    if let Some(n) = top_k.as_u64() {
        return Ok(usize::try_from(n).unwrap_or(usize::MAX));
    }
    if top_k.is_i64() {
        return Err(at_least_one());
    }

    match top_k.as_f64() {
        Some(n) if n.fract() == 0.0 && n >= 0.0 => Ok(n as usize),
        Some(n) if n.fract() == 0.0 => Err(at_least_one()),
        _ => Err(SearchError::InvalidQuery(
            "top_k must be an integer".to_string(),
        )),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_quotes: usize,
    pub unique_authors: usize,
    pub quotes_with_known_authors: usize,
    pub model: String,
}

impl StatsResponse {
    pub fn new(stats: CorpusStats, model: &str) -> Self {
        Self {
            total_quotes: stats.total,
            unique_authors: stats.unique_authors,
            quotes_with_known_authors: stats.known_author_count,
            model: model.to_string(),
        }
    }
}

async fn stats(State(state): State<Arc<SharedState>>) -> Json<StatsResponse> {
    let engine = &state.engine;
    Json(StatsResponse::new(engine.corpus().stats(), engine.model_name()))
}

/// Serves the voice UI page, or a placeholder naming the file when it is
/// missing. Other read failures are a 500.
async fn whisper_page(State(state): State<Arc<SharedState>>) -> Response {
    match tokio::fs::read_to_string(&state.html_path).await {
        Ok(page) => Html(page).into_response(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log::warn!("{} not found", state.html_path.display());
            Html(fallback_page(&state.html_path)).into_response()
        }
        Err(err) => {
            log::error!("cannot read {}: {err}", state.html_path.display());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Internal Server Error"})),
            )
                .into_response()
        }
    }
}

fn fallback_page(html_path: &std::path::Path) -> String {
    let name = html_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| html_path.display().to_string());

    format!(
        r#"<html>
<body style="background: #0a0807; color: #e8e3df; font-family: serif; padding: 40px; text-align: center;">
    <h1>Whisper</h1>
    <p>File '{name}' not found</p>
</body>
</html>
"#
    )
}
