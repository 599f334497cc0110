//! HTTP router and handler chain composition

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use proxystack_core::{InfoRegistry, MetricsRegistry};
use proxystack_proxy::{compose, ProxyServer};
use proxystack_storage::{InternalApi, MemoryStorage, ObjectStorage};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;

/// Shared state for the main router
pub struct AppState {
    server: ProxyServer,
    info: InfoRegistry,
}

impl AppState {
    /// Compose the handler chain: credential resolution, then S3
    /// translation, over the in-memory internal API
    pub fn new(config: &Config) -> Self {
        let storage: Arc<dyn ObjectStorage> = Arc::new(MemoryStorage::new());
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: &Config, storage: Arc<dyn ObjectStorage>) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut info = InfoRegistry::new();
        let credentials = Arc::new(config.credential_store());

        info!(
            s3api = config.s3api.enabled,
            credentials = credentials.len(),
            "Composing handler chain"
        );
        let layers = vec![
            proxystack_auth::layer(credentials),
            proxystack_s3::layer(&config.s3api, &metrics, &mut info),
        ];
        let chain = compose(Arc::new(InternalApi::new(storage)), layers);

        Self {
            server: ProxyServer::new(chain, metrics),
            info,
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(capabilities))
        // Everything else goes through the handler chain
        .fallback(handle_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counters = state.server.metrics().snapshot();
    (StatusCode::OK, Json(json!({ "status": "running", "counters": counters })))
}

async fn capabilities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.info.to_json())
}

async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    state.server.handle(request).await
}
