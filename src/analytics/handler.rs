use crate::analytics::types::{AnalyticsSummary, SummaryQueryParams};
use crate::analytics::AnalyticsState;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;

/// GET /api/admin/analytics?days=N
///
/// Admin-only; the cookie check runs as route middleware. Never fails once
/// authorized: store problems degrade to an emptier summary.
pub async fn get_summary(
    State(state): State<Arc<AnalyticsState>>,
    Query(params): Query<SummaryQueryParams>,
) -> Json<AnalyticsSummary> {
    let days = params.days();
    let started = std::time::Instant::now();
    let summary = state.summary(days).await;
    tracing::info!(
        days,
        total_events = summary.total_events,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analytics summary served"
    );
    Json(summary)
}
