//! `WardenServer`: router assembly and serving.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use warden_runtime::ChatGateway;
use warden_settings::ServerSettings;

use crate::routes;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline.
    pub gateway: Arc<ChatGateway>,
    /// Honour `CF-Connecting-IP` / `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The HTTP server.
pub struct WardenServer {
    settings: ServerSettings,
    state: AppState,
}

impl WardenServer {
    /// Server over `gateway`.
    pub fn new(
        settings: ServerSettings,
        gateway: Arc<ChatGateway>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let state = AppState {
            gateway,
            trust_proxy_headers: settings.trust_proxy_headers,
            metrics,
            start_time: Instant::now(),
        };
        Self { settings, state }
    }

    /// Server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/chat", post(routes::chat))
            .route(
                "/api/conversations/{id}",
                get(routes::get_conversation).delete(routes::delete_conversation),
            )
            .route("/api/rate-limit/stats", get(routes::rate_limit_stats))
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .layer(cors_layer(&self.settings.allowed_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "warden listening");
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    }
}

/// CORS for the browser client: any origin when `"*"` is configured,
/// otherwise the listed origins.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
