use crate::analytics::sessions::SessionFacts;
use crate::analytics::stats::{mean, round_to, to_rate};
use crate::analytics::types::{PerformanceVitals, VitalsCorrelation, VitalsPageStat};
use crate::types::{AnalyticsEvent, MetricName};
use std::collections::{BTreeMap, BTreeSet};

const TOP_PAGES: usize = 20;

/// "Poor" thresholds; a session is poor if any metric's maximum exceeds its limit.
pub const POOR_LCP_MS: f64 = 2500.0;
pub const POOR_INP_MS: f64 = 200.0;
pub const POOR_CLS: f64 = 0.1;

#[derive(Default)]
struct PageSamples<'a> {
    lcp: Vec<f64>,
    inp: Vec<f64>,
    cls: Vec<f64>,
    sessions: BTreeSet<&'a str>,
}

#[derive(Default, Clone, Copy)]
struct SessionWorst {
    lcp: f64,
    inp: f64,
    cls: f64,
}

impl SessionWorst {
    fn is_poor(&self) -> bool {
        self.lcp > POOR_LCP_MS || self.inp > POOR_INP_MS || self.cls > POOR_CLS
    }
}

fn bounce_rate<'s>(sessions: impl Iterator<Item = &'s str>, facts: &SessionFacts<'_>) -> f64 {
    let mut total = 0u64;
    let mut bounced = 0u64;
    for session in sessions {
        total += 1;
        if facts.is_bounce(session) {
            bounced += 1;
        }
    }
    to_rate(bounced, total.max(1))
}

pub fn performance_vitals(events: &[&AnalyticsEvent], facts: &SessionFacts<'_>) -> PerformanceVitals {
    let mut pages: BTreeMap<&str, PageSamples<'_>> = BTreeMap::new();
    let mut worst: BTreeMap<&str, SessionWorst> = BTreeMap::new();

    for event in events.iter().filter(|e| e.event_name == "web_vital") {
        let path = if event.path.is_empty() { "/" } else { event.path.as_str() };
        let page = pages.entry(path).or_default();
        page.sessions.insert(event.session_id.as_str());

        let session = worst.entry(event.session_id.as_str()).or_default();
        match event.meta.metric_name {
            MetricName::Lcp => {
                page.lcp.push(event.value);
                session.lcp = session.lcp.max(event.value);
            }
            MetricName::Inp => {
                page.inp.push(event.value);
                session.inp = session.inp.max(event.value);
            }
            MetricName::Cls => {
                page.cls.push(event.value);
                session.cls = session.cls.max(event.value);
            }
            MetricName::Other | MetricName::None => {}
        }
    }

    let mut by_page: Vec<VitalsPageStat> = pages
        .into_iter()
        .map(|(path, page)| VitalsPageStat {
            path: path.to_string(),
            lcp: round_to(mean(&page.lcp), 2),
            inp: round_to(mean(&page.inp), 2),
            cls: round_to(mean(&page.cls), 3),
            samples: page.sessions.len() as u64,
            bounce_rate: bounce_rate(page.sessions.iter().copied(), facts),
        })
        .collect();
    by_page.sort_by(|a, b| b.samples.cmp(&a.samples));
    by_page.truncate(TOP_PAGES);

    let (poor, good): (Vec<_>, Vec<_>) = worst.iter().partition(|(_, w)| w.is_poor());

    PerformanceVitals {
        by_page,
        correlation: VitalsCorrelation {
            poor_vitals_bounce_rate: bounce_rate(poor.into_iter().map(|(s, _)| *s), facts),
            good_vitals_bounce_rate: bounce_rate(good.into_iter().map(|(s, _)| *s), facts),
        },
    }
}
