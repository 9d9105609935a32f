pub mod anomaly;
pub mod funnel;
pub mod handler;
pub mod impact;
pub mod series;
pub mod sessions;
pub mod stats;
pub mod types;
pub mod vitals;

use crate::config::AnalyticsConfig;
use crate::storage::EventStore;
use crate::types::{iso_millis, AnalyticsEvent};
use chrono::{DateTime, Duration, Utc};
use sessions::SessionFacts;
use stats::to_rate;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use types::*;

const TOP_TARGETS: usize = 12;
const TOP_SOURCES: usize = 12;
const RECENT_EVENTS: usize = 40;
const REAL_TIME_WINDOW_MINUTES: i64 = 5;

/// Public events of each session in ascending time order, keyed by session id.
pub type SessionMap<'a> = BTreeMap<&'a str, Vec<&'a AnalyticsEvent>>;

pub fn group_sessions<'a>(events: &[&'a AnalyticsEvent]) -> SessionMap<'a> {
    let mut sessions: SessionMap<'a> = BTreeMap::new();
    for &event in events {
        sessions.entry(event.session_id.as_str()).or_default().push(event);
    }
    for list in sessions.values_mut() {
        list.sort_by_key(|e| e.occurred_ms());
    }
    sessions
}

/// Tunables for the summary, resolved from `[analytics]` config.
#[derive(Debug, Clone)]
pub struct SummarySettings {
    contact_domains: Vec<String>,
    pub spike_sigma: f64,
    pub spike_floor: u64,
    pub bot_share_alert_pct: f64,
    pub contact_rate_floor_pct: f64,
    pub contact_min_sessions: u64,
}

impl From<&AnalyticsConfig> for SummarySettings {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            contact_domains: config
                .contact_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            spike_sigma: config.spike_sigma,
            spike_floor: config.spike_floor,
            bot_share_alert_pct: config.bot_share_alert_pct,
            contact_rate_floor_pct: config.contact_rate_floor_pct,
            contact_min_sessions: config.contact_min_sessions,
        }
    }
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self::from(&AnalyticsConfig::default())
    }
}

impl SummarySettings {
    /// `mailto:` links and links mentioning a scheduling domain.
    pub fn is_contact_href(&self, href: &str) -> bool {
        let lower = href.to_lowercase();
        lower.starts_with("mailto:") || self.contact_domains.iter().any(|d| lower.contains(d.as_str()))
    }

    pub fn is_contact_click(&self, event: &AnalyticsEvent) -> bool {
        event.event_name == "outbound_click" && self.is_contact_href(&event.href)
    }
}

/// Shared state for the summary endpoint.
pub struct AnalyticsState {
    pub store: Arc<EventStore>,
    pub settings: SummarySettings,
}

impl AnalyticsState {
    pub fn new(store: Arc<EventStore>, config: &AnalyticsConfig) -> Self {
        Self {
            store,
            settings: SummarySettings::from(config),
        }
    }

    /// One bulk read, then pure computation.
    pub async fn summary(&self, days: u32) -> AnalyticsSummary {
        let events = self.store.read_all().await;
        compute_summary(&events, days, Utc::now(), &self.settings)
    }
}

struct TargetAcc {
    label: String,
    clicks: u64,
    days: BTreeSet<String>,
}

/// Derive the full summary from a bounded event history.
pub fn compute_summary(
    events: &[AnalyticsEvent],
    days: u32,
    now: DateTime<Utc>,
    settings: &SummarySettings,
) -> AnalyticsSummary {
    let days = days.clamp(MIN_DAYS, MAX_DAYS);

    let mut all: Vec<&AnalyticsEvent> = events.iter().collect();
    all.sort_by_key(|e| Reverse(e.occurred_ms()));

    let public: Vec<&AnalyticsEvent> = all
        .iter()
        .copied()
        .filter(|e| !e.is_bot && e.is_public())
        .collect();
    let clicks: Vec<&AnalyticsEvent> = public.iter().copied().filter(|e| e.is_click_like()).collect();

    let real_time_since = (now - Duration::minutes(REAL_TIME_WINDOW_MINUTES)).timestamp_millis();
    let day_ago = (now - Duration::hours(24)).timestamp_millis();

    let real_time_views = public
        .iter()
        .filter(|e| {
            e.occurred_ms() >= real_time_since
                && (e.event_name == "page_view" || e.event_name == "page_heartbeat")
        })
        .map(|e| e.session_id.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u64;
    let last24h_clicks = clicks.iter().filter(|e| e.occurred_ms() >= day_ago).count() as u64;

    // ── Targets & sources ──
    let mut targets: BTreeMap<(&str, &str), TargetAcc> = BTreeMap::new();
    let mut sources: BTreeMap<&str, u64> = BTreeMap::new();
    for event in &clicks {
        let target = targets
            .entry((event.href.as_str(), event.label.as_str()))
            .or_insert_with(|| TargetAcc {
                label: [&event.label, &event.href, &event.source_context]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_default(),
                clicks: 0,
                days: BTreeSet::new(),
            });
        target.clicks += 1;
        target.days.insert(event.day_key());

        let source = if event.source_context.is_empty() {
            event.source.as_str()
        } else {
            event.source_context.as_str()
        };
        *sources.entry(source).or_default() += 1;
    }

    let unique_targets = targets.len() as u64;
    let mut top_targets: Vec<TargetStat> = targets
        .into_iter()
        .map(|((href, _), acc)| TargetStat {
            href: href.to_string(),
            label: acc.label,
            clicks: acc.clicks,
            unique_days: acc.days.len() as u64,
        })
        .collect();
    top_targets.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    top_targets.truncate(TOP_TARGETS);

    let mut source_breakdown: Vec<SourceClicks> = sources
        .into_iter()
        .map(|(source, clicks)| SourceClicks {
            source: source.to_string(),
            clicks,
        })
        .collect();
    source_breakdown.sort_by(|a, b| b.clicks.cmp(&a.clicks));
    source_breakdown.truncate(TOP_SOURCES);

    // ── Series ──
    let daily_clicks = series::daily_series(&clicks, days, now);
    let hourly_clicks = series::hourly_series(&clicks, now);
    let weekly_trends = series::weekly_trends(&clicks, now, settings);

    // ── Sessions ──
    let by_session = group_sessions(&public);
    let facts = SessionFacts::collect(&by_session, settings);
    let conversion_funnel = funnel::conversion_funnel(&by_session, settings);

    let total_events = all.len() as u64;
    let bot_events = all.iter().filter(|e| e.is_bot).count() as u64;
    let bot_stats = BotStats {
        filtered_events: bot_events,
        bot_share_pct: to_rate(bot_events, total_events.max(1)),
    };

    let anomaly_alerts = anomaly::anomaly_alerts(
        &hourly_clicks,
        bot_stats.bot_share_pct,
        &conversion_funnel,
        settings,
    );

    let recent_events = public
        .iter()
        .take(RECENT_EVENTS)
        .map(|e| RecentEvent {
            occurred_at: iso_millis::format(&e.occurred_at),
            event_name: e.event_name.clone(),
            source_context: e.source_context.clone(),
            label: e.label.clone(),
            href: e.href.clone(),
            path: e.path.clone(),
        })
        .collect();

    tracing::debug!(
        total_events,
        public_events = public.len(),
        sessions = by_session.len(),
        "computed analytics summary"
    );

    AnalyticsSummary {
        generated_at: iso_millis::format(&now),
        real_time_views,
        total_events,
        total_clicks: clicks.len() as u64,
        last24h_clicks,
        unique_targets,
        top_targets,
        source_breakdown,
        daily_clicks,
        hourly_clicks,
        weekly_trends,
        conversion_funnel,
        top_content: sessions::top_content(&by_session, &facts),
        outbound_quality: sessions::outbound_quality(&public, settings),
        scroll_depth_by_page: sessions::scroll_depth_by_page(&by_session),
        section_visibility: sessions::section_visibility(&by_session, &facts),
        audience_segments: sessions::audience_segments(&by_session, settings),
        content_impact: impact::content_impact(&all, &public, now, settings),
        performance_vitals: vitals::performance_vitals(&public, &facts),
        anomaly_alerts,
        bot_stats,
        recent_events,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{EventMeta, Source};
    use chrono::TimeZone;

    /// Bare public event for fixtures.
    pub fn event_at(at: DateTime<Utc>, name: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            occurred_at: at,
            event_name: name.to_string(),
            session_id: "session".to_string(),
            path: "/".to_string(),
            source: Source::Other,
            source_context: String::new(),
            label: String::new(),
            href: String::new(),
            section: String::new(),
            item_id: String::new(),
            item_type: String::new(),
            value: 0.0,
            duration_ms: 0,
            is_bot: false,
            meta: EventMeta::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 12, 16, 30, 0).unwrap()
    }

    fn click(href: &str, at: DateTime<Utc>) -> AnalyticsEvent {
        let mut e = event_at(at, "click");
        e.href = href.to_string();
        e.source = Source::Nav;
        e
    }

    #[test]
    fn test_basic_click_aggregation() {
        let today = now() - Duration::hours(2);
        let events = vec![
            click("/apps", today),
            click("/apps", today + Duration::minutes(5)),
            click("/labs", today + Duration::minutes(9)),
        ];
        let summary = compute_summary(&events, 14, now(), &SummarySettings::default());

        assert_eq!(summary.total_clicks, 3);
        assert_eq!(summary.unique_targets, 2);
        let apps = summary.top_targets.iter().find(|t| t.href == "/apps").unwrap();
        assert_eq!(apps.clicks, 2);
        assert_eq!(apps.unique_days, 1);
        assert_eq!(apps.label, "/apps");
        assert_eq!(summary.daily_clicks.len(), 14);
        assert_eq!(summary.daily_clicks.last().unwrap().clicks, 3);
        assert_eq!(summary.source_breakdown, vec![SourceClicks { source: "nav".into(), clicks: 3 }]);
        assert_eq!(summary.last24h_clicks, 3);
    }

    #[test]
    fn test_bot_exclusion() {
        let mut bot = click("/apps", now() - Duration::minutes(30));
        bot.is_bot = true;
        bot.session_id = "crawler".into();
        let human = click("/labs", now() - Duration::minutes(20));
        let mut admin = click("/admin/settings", now() - Duration::minutes(10));
        admin.path = "/admin".into();

        let summary = compute_summary(&[bot, human, admin], 7, now(), &SummarySettings::default());
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.total_clicks, 1);
        assert_eq!(summary.top_targets.len(), 1);
        assert_eq!(summary.top_targets[0].href, "/labs");
        assert_eq!(summary.bot_stats.filtered_events, 1);
        assert_eq!(summary.bot_stats.bot_share_pct, 33.33);
        assert!(summary
            .audience_segments
            .by_source
            .iter()
            .all(|row| row.sessions == 1));
        assert_eq!(summary.recent_events.len(), 1);
    }

    #[test]
    fn test_real_time_views_counts_recent_sessions() {
        let mut a = event_at(now() - Duration::minutes(1), "page_view");
        a.session_id = "a".into();
        let mut b = event_at(now() - Duration::minutes(4), "page_heartbeat");
        b.session_id = "b".into();
        let mut a_again = event_at(now() - Duration::minutes(2), "page_heartbeat");
        a_again.session_id = "a".into();
        let mut stale = event_at(now() - Duration::minutes(6), "page_view");
        stale.session_id = "c".into();

        let summary = compute_summary(&[a, b, a_again, stale], 14, now(), &SummarySettings::default());
        assert_eq!(summary.real_time_views, 2);
    }

    #[test]
    fn test_empty_store_summary_shape() {
        let summary = compute_summary(&[], 3, now(), &SummarySettings::default());
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.daily_clicks.len(), 7);
        assert_eq!(summary.hourly_clicks.len(), 24);
        assert_eq!(summary.weekly_trends.len(), 8);
        assert_eq!(summary.audience_segments.by_hour.len(), 24);
        assert!(summary.anomaly_alerts.is_empty());
        assert_eq!(summary.content_impact.latest_publish_at, None);
        assert_eq!(summary.generated_at, "2025-06-12T16:30:00.000Z");

        let json = serde_json::to_value(&summary).unwrap();
        for key in [
            "generatedAt",
            "realTimeViews",
            "last24hClicks",
            "conversionFunnel",
            "scrollDepthByPage",
            "audienceSegments",
            "performanceVitals",
            "botStats",
            "recentEvents",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["contentImpact"]["latestPublishAt"].is_null());
    }

    #[test]
    fn test_huge_view_times_do_not_overflow() {
        use crate::ingest::normalize::{normalize_event, Enrichment, MAX_DURATION_MS};
        use serde_json::json;

        let payload = json!({
            "eventName": "gallery_item_view_time",
            "itemId": "poster",
            "durationMs": 1e300,
            "occurredAt": "2025-06-12T16:00:00Z",
        });
        let capped = normalize_event(&payload, &Enrichment::default(), now()).unwrap();
        // Rows written before the ingest cap existed can still hold anything.
        let mut stored = event_at(now() - Duration::minutes(5), "gallery_item_view_time");
        stored.item_id = "poster".into();
        stored.duration_ms = i64::MAX;
        let events = vec![capped.clone(), capped, stored.clone(), stored];

        let summary = compute_summary(&events, 14, now(), &SummarySettings::default());
        let poster = summary
            .top_content
            .iter()
            .find(|c| c.item_id == "poster")
            .unwrap();
        assert!(poster.avg_view_seconds >= 2.0 * MAX_DURATION_MS / 1000.0);
    }

    #[test]
    fn test_rates_are_bounded() {
        let mut events = Vec::new();
        for i in 0..40i64 {
            let at = now() - Duration::minutes(i * 17);
            let mut e = event_at(at, ["page_view", "section_view", "outbound_click", "web_vital"][(i % 4) as usize]);
            e.session_id = format!("s{}", i % 7);
            e.section = if i % 3 == 0 { "contact".into() } else { "about".into() };
            e.href = if i % 5 == 0 { "mailto:x@y.z".into() } else { "https://example.com".into() };
            e.meta.metric_name = crate::types::MetricName::Lcp;
            e.value = (i * 150) as f64;
            e.is_bot = i % 11 == 0;
            events.push(e);
        }
        let summary = compute_summary(&events, 14, now(), &SummarySettings::default());
        let in_range = |r: f64| (0.0..=100.0).contains(&r);

        let f = &summary.conversion_funnel;
        assert!(in_range(f.landing_to_case_rate));
        assert!(in_range(f.case_to_contact_rate));
        assert!(in_range(f.contact_to_click_rate));
        assert!(summary.section_visibility.iter().all(|s| in_range(s.drop_off_rate)));
        assert!(summary.performance_vitals.by_page.iter().all(|p| in_range(p.bounce_rate)));
        assert!(in_range(summary.performance_vitals.correlation.poor_vitals_bounce_rate));
        assert!(in_range(summary.performance_vitals.correlation.good_vitals_bounce_rate));
        assert!(summary.top_content.iter().all(|c| in_range(c.contact_follow_through_rate)));
        assert!(in_range(summary.bot_stats.bot_share_pct));
    }
}
