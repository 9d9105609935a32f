use crate::analytics::{handler as analytics_handler, AnalyticsState};
use crate::config::AppConfig;
use crate::ingest::geo::GeoResolver;
use crate::ingest::handler::{self as ingest_handler, IngestState};
use crate::ingest::Ingestor;
use crate::storage::EventStore;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Everything the routers share. Built once in `main` (or by tests).
pub struct AppParts {
    pub config: AppConfig,
    pub store: Arc<EventStore>,
    pub geo: GeoResolver,
}

/// Routers are returned separately so the binary can rate-limit ingest
/// without the limiter applying to the admin and health routes.
pub struct AppRouters {
    pub ingest: Router,
    pub api: Router,
}

impl AppRouters {
    pub fn merged(self) -> Router {
        self.api.merge(self.ingest)
    }
}

pub fn build_routers(parts: AppParts) -> AppRouters {
    let AppParts { config, store, geo } = parts;

    let ingest_state = Arc::new(IngestState {
        ingestor: Ingestor::new(geo),
        store: store.clone(),
    });
    let analytics_state = Arc::new(AnalyticsState::new(store.clone(), &config.analytics));
    let auth_config = Arc::new(config.auth.clone());

    // Beacons arrive from the public site, possibly on another origin.
    let ingest_cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // ── Ingest routes (public) ──
    let ingest = Router::new()
        .route("/api/cms/event", post(ingest_handler::record_event))
        .route("/api/cms/click", post(ingest_handler::record_click))
        .layer(DefaultBodyLimit::max(config.server.max_payload_bytes))
        .layer(ingest_cors)
        .with_state(ingest_state);

    // ── Admin routes (cookie-protected) ──
    let admin = Router::new()
        .route("/api/admin/analytics", get(analytics_handler::get_summary))
        .layer(middleware::from_fn(crate::auth::require_admin))
        .layer(axum::Extension(auth_config))
        .with_state(analytics_state);

    // ── Health route (public) ──
    let health = Router::new()
        .route("/health", get(health))
        .with_state(store);

    AppRouters {
        ingest,
        api: admin.merge(health),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_configured: bool,
    pub database_ok: Option<bool>,
}

/// GET /health - Degraded only when a configured database is unreachable;
/// the file store keeps ingest working in that case.
pub async fn health(State(store): State<Arc<EventStore>>) -> Json<HealthResponse> {
    let database_ok = store.database_ok().await;
    let status = if database_ok == Some(false) {
        "degraded"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.into(),
        database_configured: database_ok.is_some(),
        database_ok,
    })
}
