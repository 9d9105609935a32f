pub mod classify;
pub mod geo;
pub mod handler;
pub mod normalize;
pub mod server_meta;

use crate::types::AnalyticsEvent;
use axum::http::HeaderMap;
use geo::GeoResolver;
use normalize::{normalize_event, Enrichment};
use serde_json::Value;
use server_meta::ServerMeta;

/// Turns raw client payloads into stored-event records, resolving the
/// server-observed side of the metadata first.
pub struct Ingestor {
    geo: GeoResolver,
}

impl Ingestor {
    pub fn new(geo: GeoResolver) -> Self {
        Self { geo }
    }

    /// Normalize one payload against the headers of the request that carried
    /// it. Returns `None` when the payload cannot be salvaged.
    pub async fn ingest(&self, input: &Value, headers: &HeaderMap) -> Option<AnalyticsEvent> {
        let server = ServerMeta::from_headers(headers);

        // Header geo is authoritative; only ask the lookup service for gaps.
        let geo = if server.country.is_empty() || server.city.is_empty() {
            self.geo.lookup(&server.ip).await
        } else {
            None
        };

        let event = normalize_event(input, &Enrichment { server, geo }, chrono::Utc::now());
        if event.is_none() {
            tracing::debug!("dropped malformed analytics event");
        }
        event
    }
}
