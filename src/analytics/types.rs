use serde::{Deserialize, Serialize};

/// Query parameters for the summary endpoint. `days` stays a string so
/// junk input falls back to the default instead of failing the request.
#[derive(Debug, Deserialize)]
pub struct SummaryQueryParams {
    pub days: Option<String>,
}

pub const DEFAULT_DAYS: u32 = 14;
pub const MIN_DAYS: u32 = 7;
pub const MAX_DAYS: u32 = 60;

impl SummaryQueryParams {
    pub fn days(&self) -> u32 {
        let requested = self
            .days
            .as_deref()
            .map(str::trim)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|d| d.is_finite())
            .unwrap_or(DEFAULT_DAYS as f64);
        clamp_days(requested)
    }
}

/// Floor, then clamp into the supported window.
pub fn clamp_days(days: f64) -> u32 {
    if !days.is_finite() {
        return DEFAULT_DAYS;
    }
    days.floor().clamp(MIN_DAYS as f64, MAX_DAYS as f64) as u32
}

// ── Time series ──

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimePoint {
    pub label: String,
    pub clicks: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeeklyTrendPoint {
    pub label: String,
    pub clicks: u64,
    pub conversions: u64,
}

// ── Targets ──

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetStat {
    pub href: String,
    pub label: String,
    pub clicks: u64,
    pub unique_days: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceClicks {
    pub source: String,
    pub clicks: u64,
}

// ── Funnel ──

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionFunnel {
    pub landing_sessions: u64,
    pub case_study_sessions: u64,
    pub contact_section_sessions: u64,
    pub contact_click_sessions: u64,
    pub landing_to_case_rate: f64,
    pub case_to_contact_rate: f64,
    pub contact_to_click_rate: f64,
}

// ── Content & engagement ──

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentStat {
    pub item_id: String,
    pub label: String,
    pub item_type: String,
    pub opens: u64,
    pub avg_view_seconds: f64,
    pub contact_follow_through_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundStat {
    pub href: String,
    pub source_context: String,
    pub clicks: u64,
    pub contact_clicks: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrollDepthStat {
    pub path: String,
    pub avg_depth: f64,
    pub p75_depth: f64,
    pub sessions: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionStat {
    pub section: String,
    pub views: u64,
    pub unique_sessions: u64,
    pub drop_off_rate: f64,
}

// ── Audience ──

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRow {
    pub label: String,
    pub sessions: u64,
    pub clicks: u64,
    pub contact_clicks: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HourRow {
    pub hour: String,
    pub clicks: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudienceSegments {
    pub by_device: Vec<SegmentRow>,
    pub by_source: Vec<SegmentRow>,
    pub by_country: Vec<SegmentRow>,
    pub by_hour: Vec<HourRow>,
}

// ── Content impact ──

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentImpact {
    pub latest_publish_at: Option<String>,
    pub before_ctr: f64,
    pub after_ctr: f64,
    pub delta_pct: f64,
}

// ── Performance ──

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalsPageStat {
    pub path: String,
    pub lcp: f64,
    pub inp: f64,
    pub cls: f64,
    pub samples: u64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalsCorrelation {
    pub poor_vitals_bounce_rate: f64,
    pub good_vitals_bounce_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceVitals {
    pub by_page: Vec<VitalsPageStat>,
    pub correlation: VitalsCorrelation,
}

// ── Misc ──

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BotStats {
    pub filtered_events: u64,
    pub bot_share_pct: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    pub occurred_at: String,
    pub event_name: String,
    pub source_context: String,
    pub label: String,
    pub href: String,
    pub path: String,
}

/// Everything the dashboard renders, recomputed on every request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub generated_at: String,
    pub real_time_views: u64,
    pub total_events: u64,
    pub total_clicks: u64,
    pub last24h_clicks: u64,
    pub unique_targets: u64,
    pub top_targets: Vec<TargetStat>,
    pub source_breakdown: Vec<SourceClicks>,
    pub daily_clicks: Vec<TimePoint>,
    pub hourly_clicks: Vec<TimePoint>,
    pub weekly_trends: Vec<WeeklyTrendPoint>,
    pub conversion_funnel: ConversionFunnel,
    pub top_content: Vec<ContentStat>,
    pub outbound_quality: Vec<OutboundStat>,
    pub scroll_depth_by_page: Vec<ScrollDepthStat>,
    pub section_visibility: Vec<SectionStat>,
    pub audience_segments: AudienceSegments,
    pub content_impact: ContentImpact,
    pub performance_vitals: PerformanceVitals,
    pub anomaly_alerts: Vec<String>,
    pub bot_stats: BotStats,
    pub recent_events: Vec<RecentEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(days: Option<&str>) -> SummaryQueryParams {
        SummaryQueryParams {
            days: days.map(str::to_string),
        }
    }

    #[test]
    fn test_days_parsing_and_clamping() {
        assert_eq!(params(None).days(), 14);
        assert_eq!(params(Some("abc")).days(), 14);
        assert_eq!(params(Some("NaN")).days(), 14);
        assert_eq!(params(Some("3")).days(), 7);
        assert_eq!(params(Some("30.9")).days(), 30);
        assert_eq!(params(Some("365")).days(), 60);
        assert_eq!(params(Some("-20")).days(), 7);
    }

    #[test]
    fn test_bot_stats_field_names() {
        let json = serde_json::to_value(BotStats::default()).unwrap();
        assert!(json.get("filteredEvents").is_some());
        assert!(json.get("botSharePct").is_some());
    }
}
