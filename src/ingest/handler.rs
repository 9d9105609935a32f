use crate::error::{AppError, AppResult, LoggedJson};
use crate::ingest::Ingestor;
use crate::storage::EventStore;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct IngestState {
    pub ingestor: Ingestor,
    pub store: Arc<EventStore>,
}

impl IngestState {
    /// Normalize and persist one payload. `false` means it was dropped.
    async fn record(&self, payload: &Value, headers: &HeaderMap) -> bool {
        match self.ingestor.ingest(payload, headers).await {
            Some(event) => self.store.append(&event).await,
            None => false,
        }
    }
}

fn has_event_name(payload: &Value) -> bool {
    payload
        .get("eventName")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty())
}

/// Either a single event object or `{ "events": [...] }`.
fn batch_items(body: &Value) -> Vec<&Value> {
    match body.get("events").and_then(Value::as_array) {
        Some(events) => events.iter().collect(),
        None => vec![body],
    }
}

/// POST /api/cms/event - Record one event or a batch.
///
/// Each event is handled independently and in order; malformed ones are
/// skipped. 400 only when no event carries a name at all.
pub async fn record_event(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    LoggedJson(body): LoggedJson<Value>,
) -> AppResult<Json<Value>> {
    let named: Vec<&Value> = batch_items(&body)
        .into_iter()
        .filter(|item| has_event_name(item))
        .collect();
    if named.is_empty() {
        return Err(AppError::Validation("Missing event name.".to_string()));
    }

    let mut accepted = 0u64;
    for payload in &named {
        if state.record(payload, &headers).await {
            accepted += 1;
        }
    }

    if accepted < named.len() as u64 {
        tracing::debug!(received = named.len(), accepted, "some analytics events were dropped");
    }

    Ok(Json(json!({ "ok": true, "accepted": accepted })))
}

/// Event payload for a legacy click. An absent source is recorded as `other`
/// in both the coarse tag and the context.
fn legacy_click_payload(source: Option<&str>, label: &str, href: &str) -> Value {
    let source = source.unwrap_or("other");
    json!({
        "eventName": "click",
        "source": source,
        "sourceContext": source,
        "label": label,
        "href": href,
    })
}

/// POST /api/cms/click - Older click beacon: `{ source, label, href }`.
pub async fn record_click(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    LoggedJson(body): LoggedJson<Value>,
) -> AppResult<Json<Value>> {
    let text = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or("").trim();
    let (label, href) = (text("label"), text("href"));
    if label.is_empty() || href.is_empty() {
        return Err(AppError::Validation("Missing click payload.".to_string()));
    }

    let payload = legacy_click_payload(body.get("source").and_then(Value::as_str), label, href);
    let stored = state.record(&payload, &headers).await;

    Ok(Json(json!({ "ok": true, "accepted": u64::from(stored) })))
}
