use crate::analytics::stats::{mean, percentile, round_to, to_rate};
use crate::analytics::types::{
    AudienceSegments, ContentStat, HourRow, OutboundStat, ScrollDepthStat, SectionStat, SegmentRow,
};
use crate::analytics::{SessionMap, SummarySettings};
use crate::types::AnalyticsEvent;
use chrono::Timelike;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const TOP_CONTENT: usize = 20;
const TOP_OUTBOUND: usize = 20;
const TOP_SCROLL_PAGES: usize = 20;
const TOP_SEGMENTS: usize = 12;

/// Per-session facts several breakdowns share.
#[derive(Debug, Default)]
pub struct SessionFacts<'a> {
    page_views: HashMap<&'a str, u64>,
    contact_sessions: HashSet<&'a str>,
}

impl<'a> SessionFacts<'a> {
    pub fn collect(sessions: &SessionMap<'a>, settings: &SummarySettings) -> Self {
        let mut facts = SessionFacts::default();
        for (&session, events) in sessions {
            let views = events.iter().filter(|e| e.event_name == "page_view").count() as u64;
            facts.page_views.insert(session, views);
            if events.iter().any(|e| settings.is_contact_click(e)) {
                facts.contact_sessions.insert(session);
            }
        }
        facts
    }

    pub fn has_contact_click(&self, session: &str) -> bool {
        self.contact_sessions.contains(session)
    }

    /// At most one page view and no contact click.
    pub fn is_bounce(&self, session: &str) -> bool {
        self.page_views.get(session).copied().unwrap_or(0) <= 1 && !self.has_contact_click(session)
    }
}

/// Stable sort by a descending count, then cap.
fn top_by<T>(mut rows: Vec<T>, limit: usize, key: impl Fn(&T) -> u64) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows.truncate(limit);
    rows
}

// ── Content ──

struct ContentAcc<'a> {
    label: String,
    opens: u64,
    total_view_ms: i64,
    sessions: BTreeSet<&'a str>,
}

/// Gallery items by opens. Follow-through counts sessions that touched the
/// item and made a contact click anywhere in the session.
pub fn top_content(sessions: &SessionMap<'_>, facts: &SessionFacts<'_>) -> Vec<ContentStat> {
    let mut items: BTreeMap<(String, String), ContentAcc<'_>> = BTreeMap::new();

    for (&session, events) in sessions {
        for event in events {
            let is_open = event.event_name == "gallery_item_open";
            let is_view = event.event_name == "gallery_item_view_time";
            if (!is_open && !is_view) || event.item_id.is_empty() {
                continue;
            }

            let item_type = if event.item_type.is_empty() {
                "gallery"
            } else {
                event.item_type.as_str()
            };
            let acc = items
                .entry((item_type.to_string(), event.item_id.clone()))
                .or_insert_with(|| ContentAcc {
                    label: if event.label.is_empty() {
                        event.item_id.clone()
                    } else {
                        event.label.clone()
                    },
                    opens: 0,
                    total_view_ms: 0,
                    sessions: BTreeSet::new(),
                });
            acc.sessions.insert(session);
            if is_open {
                acc.opens += 1;
            } else {
                acc.total_view_ms = acc.total_view_ms.saturating_add(event.duration_ms.max(0));
            }
        }
    }

    let rows = items
        .into_iter()
        .map(|((item_type, item_id), acc)| {
            let follow_through = acc
                .sessions
                .iter()
                .filter(|s| facts.has_contact_click(s))
                .count() as u64;
            ContentStat {
                item_id,
                label: acc.label,
                item_type,
                opens: acc.opens,
                avg_view_seconds: round_to(acc.total_view_ms as f64 / acc.opens.max(1) as f64 / 1000.0, 2),
                contact_follow_through_rate: to_rate(follow_through, (acc.sessions.len() as u64).max(1)),
            }
        })
        .collect();
    top_by(rows, TOP_CONTENT, |row: &ContentStat| row.opens)
}

// ── Outbound ──

pub fn outbound_quality(events: &[&AnalyticsEvent], settings: &SummarySettings) -> Vec<OutboundStat> {
    let mut links: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.event_name == "outbound_click") {
        let context = if event.source_context.is_empty() {
            "unknown"
        } else {
            event.source_context.as_str()
        };
        let entry = links
            .entry((event.href.clone(), context.to_string()))
            .or_default();
        entry.0 += 1;
        if settings.is_contact_href(&event.href) {
            entry.1 += 1;
        }
    }

    let rows = links
        .into_iter()
        .map(|((href, source_context), (clicks, contact_clicks))| OutboundStat {
            href,
            source_context,
            clicks,
            contact_clicks,
        })
        .collect();
    top_by(rows, TOP_OUTBOUND, |row: &OutboundStat| row.clicks)
}

// ── Scroll depth ──

/// Deepest scroll per (session, path), summarized per path.
pub fn scroll_depth_by_page(sessions: &SessionMap<'_>) -> Vec<ScrollDepthStat> {
    let mut per_session: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for (&session, events) in sessions {
        for event in events.iter().filter(|e| e.event_name == "scroll_depth" && !e.path.is_empty()) {
            let depth = per_session.entry((session, event.path.as_str())).or_insert(0.0);
            *depth = depth.max(event.value);
        }
    }

    let mut per_path: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for ((_, path), depth) in per_session {
        per_path.entry(path).or_default().push(depth);
    }

    let rows = per_path
        .into_iter()
        .map(|(path, depths)| ScrollDepthStat {
            path: path.to_string(),
            avg_depth: round_to(mean(&depths), 1),
            p75_depth: round_to(percentile(&depths, 75.0), 1),
            sessions: depths.len() as u64,
        })
        .collect();
    top_by(rows, TOP_SCROLL_PAGES, |row: &ScrollDepthStat| row.sessions)
}

// ── Sections ──

pub fn section_visibility(sessions: &SessionMap<'_>, facts: &SessionFacts<'_>) -> Vec<SectionStat> {
    let mut sections: BTreeMap<String, (u64, BTreeSet<&str>)> = BTreeMap::new();
    for (&session, events) in sessions {
        for event in events
            .iter()
            .filter(|e| e.event_name == "section_view" && !e.section.is_empty())
        {
            let entry = sections.entry(event.section.to_lowercase()).or_default();
            entry.0 += 1;
            entry.1.insert(session);
        }
    }

    let rows = sections
        .into_iter()
        .map(|(section, (views, viewers))| {
            let dropped = viewers.iter().filter(|s| !facts.has_contact_click(s)).count() as u64;
            SectionStat {
                section,
                views,
                unique_sessions: viewers.len() as u64,
                drop_off_rate: to_rate(dropped, viewers.len() as u64),
            }
        })
        .collect();
    top_by(rows, usize::MAX, |row: &SectionStat| row.unique_sessions)
}

// ── Audience ──

#[derive(Default)]
struct SegmentAcc {
    sessions: u64,
    clicks: u64,
    contact_clicks: u64,
}

fn segment_rows(buckets: BTreeMap<String, SegmentAcc>) -> Vec<SegmentRow> {
    let rows = buckets
        .into_iter()
        .map(|(label, acc)| SegmentRow {
            label,
            sessions: acc.sessions,
            clicks: acc.clicks,
            contact_clicks: acc.contact_clicks,
        })
        .collect();
    top_by(rows, TOP_SEGMENTS, |row: &SegmentRow| row.sessions)
}

/// Source label used for acquisition buckets.
pub fn acquisition_source(event: &AnalyticsEvent) -> &str {
    if !event.meta.utm_source.is_empty() {
        &event.meta.utm_source
    } else if !event.meta.referrer_host.is_empty() {
        &event.meta.referrer_host
    } else {
        "direct"
    }
}

/// Sessions are bucketed by the attributes of their first event, and all of
/// a session's clicks are credited to those buckets.
///
/// Earlier reports credited each click to the bucket matching the click's own
/// device, source and country (when such a bucket existed). Click counts per
/// segment therefore do not line up with history recorded that way.
pub fn audience_segments(sessions: &SessionMap<'_>, settings: &SummarySettings) -> AudienceSegments {
    let mut by_source: BTreeMap<String, SegmentAcc> = BTreeMap::new();
    let mut by_device: BTreeMap<String, SegmentAcc> = BTreeMap::new();
    let mut by_country: BTreeMap<String, SegmentAcc> = BTreeMap::new();
    let mut by_hour = [0u64; 24];

    for events in sessions.values() {
        let Some(first) = events.first() else {
            continue;
        };

        let clicks = events.iter().filter(|e| e.is_click_like()).count() as u64;
        let mut contact_clicks = 0;
        for event in events.iter().filter(|e| settings.is_contact_click(e)) {
            contact_clicks += 1;
            by_hour[event.occurred_at.hour() as usize] += 1;
        }

        let country = if first.meta.country.is_empty() {
            "unknown"
        } else {
            first.meta.country.as_str()
        };
        for (buckets, label) in [
            (&mut by_source, acquisition_source(first)),
            (&mut by_device, first.meta.device.as_str()),
            (&mut by_country, country),
        ] {
            let acc = buckets.entry(label.to_string()).or_default();
            acc.sessions += 1;
            acc.clicks += clicks;
            acc.contact_clicks += contact_clicks;
        }
    }

    AudienceSegments {
        by_device: segment_rows(by_device),
        by_source: segment_rows(by_source),
        by_country: segment_rows(by_country),
        by_hour: by_hour
            .iter()
            .enumerate()
            .map(|(hour, &clicks)| HourRow {
                hour: format!("{hour:02}:00"),
                clicks,
            })
            .collect(),
    }
}
