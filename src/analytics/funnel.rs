use crate::analytics::stats::to_rate;
use crate::analytics::types::ConversionFunnel;
use crate::analytics::{SessionMap, SummarySettings};
use crate::types::AnalyticsEvent;
use once_cell::sync::Lazy;
use regex::Regex;

static CASE_STUDY_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(apps|website|sites|labs)(/|$)").unwrap());

fn is_landing(event: &AnalyticsEvent) -> bool {
    event.event_name == "page_view" && event.path == "/"
}

fn is_case_study(event: &AnalyticsEvent) -> bool {
    (event.event_name == "page_view" && CASE_STUDY_PATH_RE.is_match(&event.path))
        || (event.event_name == "section_view" && event.section.eq_ignore_ascii_case("case-studies"))
}

fn is_contact_section(event: &AnalyticsEvent) -> bool {
    event.event_name == "section_view" && event.section.eq_ignore_ascii_case("contact")
}

/// How many funnel stages one session reached (0..=4). `events` must be in
/// ascending time order. Each stage only counts if it happened at or after
/// the stage before it; a session that skips a stage stops there.
pub fn stages_reached(events: &[&AnalyticsEvent], settings: &SummarySettings) -> usize {
    let is_contact_click = |e: &AnalyticsEvent| settings.is_contact_click(e);
    let stages: [&dyn Fn(&AnalyticsEvent) -> bool; 4] = [
        &is_landing,
        &is_case_study,
        &is_contact_section,
        &is_contact_click,
    ];

    let mut marker_ms = i64::MIN;
    let mut reached = 0;
    for stage in stages {
        let Some(hit) = events
            .iter()
            .copied()
            .find(|e| e.occurred_ms() >= marker_ms && stage(*e))
        else {
            break;
        };
        marker_ms = hit.occurred_ms();
        reached += 1;
    }
    reached
}

pub fn conversion_funnel(sessions: &SessionMap<'_>, settings: &SummarySettings) -> ConversionFunnel {
    let mut counts = [0u64; 4];
    for events in sessions.values() {
        let reached = stages_reached(events, settings);
        for count in counts.iter_mut().take(reached) {
            *count += 1;
        }
    }
    let [landing, case_study, contact_section, contact_click] = counts;

    ConversionFunnel {
        landing_sessions: landing,
        case_study_sessions: case_study,
        contact_section_sessions: contact_section,
        contact_click_sessions: contact_click,
        landing_to_case_rate: to_rate(case_study, landing.max(1)),
        case_to_contact_rate: to_rate(contact_section, case_study.max(1)),
        contact_to_click_rate: to_rate(contact_click, contact_section.max(1)),
    }
}
