use crate::analytics::stats::round_to;
use crate::analytics::types::ContentImpact;
use crate::analytics::SummarySettings;
use crate::types::{iso_millis, AnalyticsEvent};
use chrono::{DateTime, Utc};

const WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Landing click-through over `[start_ms, end_ms)`: folder tile clicks plus
/// contact clicks, per landing page view.
fn landing_ctr(
    events: &[&AnalyticsEvent],
    start_ms: i64,
    end_ms: i64,
    settings: &SummarySettings,
) -> f64 {
    let mut landing_views = 0u64;
    let mut actions = 0u64;
    for event in events {
        let ms = event.occurred_ms();
        if ms < start_ms || ms >= end_ms {
            continue;
        }
        if event.event_name == "page_view" && event.path == "/" {
            landing_views += 1;
        }
        if event.event_name == "folder_tile_click" || settings.is_contact_click(event) {
            actions += 1;
        }
    }
    actions as f64 / landing_views.max(1) as f64
}

/// Compare landing CTR for the week before and after the latest CMS publish.
/// `all` is searched for the publish marker; CTR is computed over `public`.
pub fn content_impact(
    all: &[&AnalyticsEvent],
    public: &[&AnalyticsEvent],
    now: DateTime<Utc>,
    settings: &SummarySettings,
) -> ContentImpact {
    let Some(publish) = all
        .iter()
        .filter(|e| e.event_name == "cms_publish")
        .max_by_key(|e| e.occurred_ms())
    else {
        return ContentImpact::default();
    };

    let publish_ms = publish.occurred_ms();
    let before = landing_ctr(public, publish_ms - WINDOW_MS, publish_ms, settings);
    let after = landing_ctr(
        public,
        publish_ms,
        now.timestamp_millis().min(publish_ms + WINDOW_MS),
        settings,
    );
    let delta_pct = if before > 0.0 {
        round_to((after - before) / before * 100.0, 2)
    } else {
        0.0
    };

    ContentImpact {
        latest_publish_at: Some(iso_millis::format(&publish.occurred_at)),
        before_ctr: round_to(before * 100.0, 2),
        after_ctr: round_to(after * 100.0, 2),
        delta_pct,
    }
}
