use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse origin tag for an event. Unrecognized values coerce to `Other`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Nav,
    Folder,
    Command,
    Gallery,
    Outbound,
    Section,
    Scroll,
    Performance,
    System,
    #[default]
    #[serde(other)]
    Other,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Nav => "nav",
            Source::Folder => "folder",
            Source::Command => "command",
            Source::Gallery => "gallery",
            Source::Outbound => "outbound",
            Source::Section => "section",
            Source::Scroll => "scroll",
            Source::Performance => "performance",
            Source::System => "system",
            Source::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "nav" => Source::Nav,
            "folder" => Source::Folder,
            "command" => Source::Command,
            "gallery" => Source::Gallery,
            "outbound" => Source::Outbound,
            "section" => Source::Section,
            "scroll" => Source::Scroll,
            "performance" => Source::Performance,
            "system" => Source::System,
            _ => Source::Other,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device class derived from the user agent on the server.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mobile,
    Tablet,
    Desktop,
    Bot,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
            Device::Desktop => "desktop",
            Device::Bot => "bot",
            Device::Unknown => "unknown",
        }
    }
}

/// Web vital carried by `web_vital` events.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
pub enum MetricName {
    #[serde(rename = "LCP")]
    Lcp,
    #[serde(rename = "INP")]
    Inp,
    #[serde(rename = "CLS")]
    Cls,
    #[serde(rename = "OTHER")]
    Other,
    #[default]
    #[serde(rename = "", other)]
    None,
}

impl MetricName {
    /// Known vitals map to themselves, any other non-empty name is `Other`.
    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "" => MetricName::None,
            "LCP" => MetricName::Lcp,
            "INP" => MetricName::Inp,
            "CLS" => MetricName::Cls,
            _ => MetricName::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Lcp => "LCP",
            MetricName::Inp => "INP",
            MetricName::Cls => "CLS",
            MetricName::Other => "OTHER",
            MetricName::None => "",
        }
    }
}

/// Contextual fields attached to every event.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMeta {
    pub referrer: String,
    pub referrer_host: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub locale: String,
    pub timezone: String,
    pub country: String,
    pub city: String,
    pub site_host: String,
    pub site_origin: String,
    pub user_agent: String,
    pub device: Device,
    pub metric_name: MetricName,
}

/// A normalized, stored analytics event. Never mutated after it is written.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(with = "iso_millis")]
    pub occurred_at: DateTime<Utc>,
    pub event_name: String,
    pub session_id: String,
    pub path: String,
    pub source: Source,
    pub source_context: String,
    pub label: String,
    pub href: String,
    pub section: String,
    pub item_id: String,
    pub item_type: String,
    pub value: f64,
    pub duration_ms: i64,
    pub is_bot: bool,
    pub meta: EventMeta,
}

impl AnalyticsEvent {
    pub fn occurred_ms(&self) -> i64 {
        self.occurred_at.timestamp_millis()
    }

    /// UTC calendar day, `YYYY-MM-DD`.
    pub fn day_key(&self) -> String {
        self.occurred_at.format("%Y-%m-%d").to_string()
    }

    pub fn is_click_like(&self) -> bool {
        self.event_name.contains("click")
    }

    /// Admin and API traffic is never part of the public picture.
    pub fn is_public(&self) -> bool {
        !self.path.starts_with("/admin") && !self.path.starts_with("/api")
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2024-05-01T12:00:00.000Z`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unknown_source_deserializes_as_other() {
        let source: Source = serde_json::from_str("\"carrier-pigeon\"").unwrap();
        assert_eq!(source, Source::Other);
        assert_eq!(Source::parse("gallery"), Source::Gallery);
    }

    #[test]
    fn test_metric_name_parse() {
        assert_eq!(MetricName::parse("lcp"), MetricName::Lcp);
        assert_eq!(MetricName::parse("TTFB"), MetricName::Other);
        assert_eq!(MetricName::parse(""), MetricName::None);
        assert_eq!(serde_json::to_string(&MetricName::None).unwrap(), "\"\"");
    }

    #[test]
    fn test_occurred_at_serializes_with_millis() {
        let event = AnalyticsEvent {
            occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            event_name: "page_view".into(),
            session_id: "s1".into(),
            path: "/".into(),
            source: Source::Other,
            source_context: "other".into(),
            label: String::new(),
            href: String::new(),
            section: String::new(),
            item_id: String::new(),
            item_type: String::new(),
            value: 0.0,
            duration_ms: 0,
            is_bot: false,
            meta: EventMeta::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["occurredAt"], "2024-05-01T12:00:00.000Z");
        assert_eq!(json["meta"]["device"], "unknown");
        assert_eq!(json["meta"]["metricName"], "");
        let back: AnalyticsEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
