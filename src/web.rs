use crate::{
    faq::{FaqConfig, FaqResponseEntry},
    semantic::{FaqError, FaqHandler, MAX_RESPONSES, MIN_RESPONSES},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

const DEFAULT_RESPONSE_COUNT: i64 = 5;

#[derive(Clone)]
pub struct SharedState {
    handler: Arc<FaqHandler>,
    faq_config: Arc<FaqConfig>,
}

impl SharedState {
    pub fn new(handler: Arc<FaqHandler>, faq_config: Arc<FaqConfig>) -> Self {
        Self {
            handler,
            faq_config,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
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

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/faq/search", get(search))
        .route("/faq/config", get(get_config))
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

async fn start_app(listen_addr: String, state: SharedState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    log::info!("listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(listen_addr: &str, state: SharedState) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(listen_addr.to_string(), state))
}

#[derive(Debug)]
struct HttpError(FaqError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            FaqError::InvalidQuery(_) => (
                axum::http::StatusCode::BAD_REQUEST,
                Json(json!({"error": self.0.to_string()})),
            ),
            _ => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
            }
        }
        .into_response()
    }
}

impl From<FaqError> for HttpError {
    fn from(err: FaqError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub question: String,

    /// Clamped to the supported range.
    #[serde(default = "default_response_count")]
    pub response_count: i64,
}

fn default_response_count() -> i64 {
    DEFAULT_RESPONSE_COUNT
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Query(request): Query<SearchRequest>,
) -> Result<Json<Vec<FaqResponseEntry>>, HttpError> {
    log::debug!("request: {request:?}");

    let count = request
        .response_count
        .clamp(MIN_RESPONSES as i64, MAX_RESPONSES as i64) as usize;
    let handler = state.handler.clone();

    tokio::task::block_in_place(move || {
        handler
            .search(&request.question, count)
            .map(Json)
            .map_err(Into::into)
    })
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Json<FaqConfig> {
    Json(state.faq_config.as_ref().clone())
}
