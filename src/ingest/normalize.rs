use crate::ingest::classify::{classify_device, is_bot_user_agent};
use crate::ingest::geo::GeoInfo;
use crate::ingest::server_meta::{parse_host, ServerMeta};
use crate::types::{AnalyticsEvent, Device, EventMeta, MetricName, Source};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Maximum stored length, in characters, of each free-text field.
pub mod limits {
    pub const EVENT_NAME: usize = 64;
    pub const SESSION_ID: usize = 80;
    pub const PATH: usize = 240;
    pub const SOURCE_CONTEXT: usize = 140;
    pub const LABEL: usize = 180;
    pub const HREF: usize = 700;
    pub const SECTION: usize = 120;
    pub const ITEM_ID: usize = 240;
    pub const ITEM_TYPE: usize = 80;
    pub const REFERRER: usize = 700;
    pub const REFERRER_HOST: usize = 180;
    pub const UTM: usize = 120;
    pub const LOCALE: usize = 80;
    pub const TIMEZONE: usize = 80;
    pub const COUNTRY: usize = 80;
    pub const CITY: usize = 120;
    pub const SITE_HOST: usize = 180;
    pub const SITE_ORIGIN: usize = 260;
    pub const USER_AGENT: usize = 300;
    pub const METRIC_NAME: usize = 12;
}

/// Events claiming to be further in the future than this are clamped to now.
const MAX_FUTURE_SKEW_MS: i64 = 5 * 60 * 1000;

/// Dwell times above a day are client noise; anything larger is stored as a day.
pub const MAX_DURATION_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Trim and truncate to `max_chars` characters. The result is trimmed again
/// so feeding it back in is a no-op.
pub fn sanitize_text(value: Option<&str>, max_chars: usize) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let truncated: String = value.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Lenient numeric coercion: numbers and numeric strings pass, everything
/// else (including NaN and infinities) is zero.
pub fn to_finite_number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn first_non_empty(candidates: impl IntoIterator<Item = String>) -> String {
    candidates
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or_default()
}

/// Parse a client timestamp. Accepts RFC 3339, a naive ISO date-time (read as
/// UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Resolve `occurredAt`: missing means now, unparseable rejects the event,
/// far-future values clamp to now. Precision is cut to milliseconds.
fn resolve_occurred_at(input: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parsed = match input.get("occurredAt") {
        None | Some(Value::Null) => now,
        Some(Value::String(raw)) => parse_timestamp(raw)?,
        Some(_) => return None,
    };

    let clamped = if parsed.timestamp_millis() > now.timestamp_millis() + MAX_FUTURE_SKEW_MS {
        now
    } else {
        parsed
    };
    DateTime::from_timestamp_millis(clamped.timestamp_millis())
}

/// Values observed by the server for the request carrying the event.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub server: ServerMeta,
    pub geo: Option<GeoInfo>,
}

/// Turn an untrusted JSON payload into a stored event. Returns `None` for
/// anything that cannot be salvaged; never panics on client data.
pub fn normalize_event(
    input: &Value,
    enrichment: &Enrichment,
    now: DateTime<Utc>,
) -> Option<AnalyticsEvent> {
    if !input.is_object() {
        return None;
    }
    let occurred_at = resolve_occurred_at(input, now)?;

    let empty = Value::Null;
    let client = input.get("meta").filter(|m| m.is_object()).unwrap_or(&empty);
    let server = &enrichment.server;
    let geo = enrichment.geo.as_ref();
    let client_text = |key: &str, max: usize| sanitize_text(text(client, key), max);

    let referrer = first_non_empty([
        sanitize_text(Some(&server.referrer), limits::REFERRER),
        client_text("referrer", limits::REFERRER),
    ]);
    let referrer_host = sanitize_text(
        Some(&first_non_empty([
            parse_host(&referrer),
            client_text("referrerHost", limits::REFERRER_HOST),
        ])),
        limits::REFERRER_HOST,
    );
    let country = first_non_empty([
        sanitize_text(Some(&server.country), limits::COUNTRY),
        sanitize_text(geo.map(|g| g.country.as_str()), limits::COUNTRY),
        client_text("country", limits::COUNTRY),
    ]);
    let city = first_non_empty([
        sanitize_text(Some(&server.city), limits::CITY),
        sanitize_text(geo.map(|g| g.city.as_str()), limits::CITY),
        client_text("city", limits::CITY),
    ]);
    let user_agent = first_non_empty([
        sanitize_text(Some(&server.user_agent), limits::USER_AGENT),
        client_text("userAgent", limits::USER_AGENT),
    ]);
    let lower = |value: Option<&str>, max: usize| {
        sanitize_text(value.map(str::to_lowercase).as_deref(), max)
    };
    let site_host = first_non_empty([
        lower(Some(&server.site_host), limits::SITE_HOST),
        lower(text(client, "siteHost"), limits::SITE_HOST),
    ]);
    let site_origin = first_non_empty([
        lower(Some(&server.site_origin), limits::SITE_ORIGIN),
        lower(text(client, "siteOrigin"), limits::SITE_ORIGIN),
    ]);

    // The client's device claim is ignored on purpose.
    let device = classify_device(&user_agent);
    let claimed_bot = input.get("isBot").and_then(Value::as_bool).unwrap_or(false);
    let is_bot = claimed_bot || device == Device::Bot || is_bot_user_agent(&user_agent);

    let raw_source = text(input, "source");
    let source_context = match text(input, "sourceContext") {
        Some(ctx) => sanitize_text(Some(ctx), limits::SOURCE_CONTEXT),
        None => sanitize_text(Some(raw_source.unwrap_or("other")), limits::SOURCE_CONTEXT),
    };

    let mut event_name = sanitize_text(text(input, "eventName"), limits::EVENT_NAME);
    if event_name.is_empty() {
        event_name = "event".to_string();
    }
    let mut session_id = sanitize_text(text(input, "sessionId"), limits::SESSION_ID);
    if session_id.is_empty() {
        session_id = uuid::Uuid::new_v4().to_string();
    }
    let mut path = sanitize_text(text(input, "path"), limits::PATH);
    if path.is_empty() {
        path = "/".to_string();
    }

    let duration = to_finite_number(input.get("durationMs"))
        .round()
        .clamp(0.0, MAX_DURATION_MS);

    Some(AnalyticsEvent {
        occurred_at,
        event_name,
        session_id,
        path,
        source: Source::parse(raw_source.unwrap_or("other")),
        source_context,
        label: sanitize_text(text(input, "label"), limits::LABEL),
        href: sanitize_text(text(input, "href"), limits::HREF),
        section: sanitize_text(text(input, "section"), limits::SECTION),
        item_id: sanitize_text(text(input, "itemId"), limits::ITEM_ID),
        item_type: sanitize_text(text(input, "itemType"), limits::ITEM_TYPE),
        value: to_finite_number(input.get("value")),
        duration_ms: duration as i64,
        is_bot,
        meta: EventMeta {
            referrer,
            referrer_host,
            utm_source: client_text("utmSource", limits::UTM),
            utm_medium: client_text("utmMedium", limits::UTM),
            utm_campaign: client_text("utmCampaign", limits::UTM),
            locale: client_text("locale", limits::LOCALE),
            timezone: client_text("timezone", limits::TIMEZONE),
            country,
            city,
            site_host,
            site_origin,
            user_agent,
            device,
            metric_name: MetricName::parse(&client_text("metricName", limits::METRIC_NAME)),
        },
    })
}
