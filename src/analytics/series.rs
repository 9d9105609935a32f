use crate::analytics::types::{TimePoint, WeeklyTrendPoint};
use crate::analytics::SummarySettings;
use crate::types::AnalyticsEvent;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

const HOUR_MS: i64 = 60 * 60 * 1000;

fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

fn day_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// "12 AM", "3 PM", ...
fn hour_label(hour: i64) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display} {suffix}")
}

/// One bucket per UTC calendar day for the `days` days ending today,
/// oldest first. Days without events are present with zero.
pub fn daily_series(events: &[&AnalyticsEvent], days: u32, now: DateTime<Utc>) -> Vec<TimePoint> {
    let today = now.date_naive();
    let start = today - Duration::days(i64::from(days.max(1)) - 1);

    let mut counts: HashMap<String, u64> = HashMap::new();
    for event in events {
        *counts.entry(event.day_key()).or_default() += 1;
    }

    (0..i64::from(days.max(1)))
        .map(|offset| {
            let date = start + Duration::days(offset);
            let key = date.format("%Y-%m-%d").to_string();
            TimePoint {
                label: day_label(date),
                clicks: counts.get(&key).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// 24 one-hour buckets aligned to the top of the hour. The first starts 23
/// hours before the current hour, the last contains `now`.
pub fn hourly_series(events: &[&AnalyticsEvent], now: DateTime<Utc>) -> Vec<TimePoint> {
    let current_hour_ms = now.timestamp_millis() - now.timestamp_millis().rem_euclid(HOUR_MS);
    let first_ms = current_hour_ms - 23 * HOUR_MS;

    let mut counts = [0u64; 24];
    for event in events {
        let ms = event.occurred_ms();
        if ms < first_ms || ms >= current_hour_ms + HOUR_MS {
            continue;
        }
        counts[((ms - first_ms) / HOUR_MS) as usize] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &clicks)| {
            let start_ms = first_ms + i as i64 * HOUR_MS;
            TimePoint {
                label: hour_label((start_ms / HOUR_MS).rem_euclid(24)),
                clicks,
            }
        })
        .collect()
}

/// Eight trailing seven-day windows, oldest first. Window `k` ends at the
/// last millisecond of the UTC day `k * 7` days ago.
pub fn weekly_trends(
    events: &[&AnalyticsEvent],
    now: DateTime<Utc>,
    settings: &SummarySettings,
) -> Vec<WeeklyTrendPoint> {
    let today = now.date_naive();

    (0..=7i64)
        .rev()
        .map(|offset| {
            let end_day = today - Duration::days(offset * 7);
            let start_day = end_day - Duration::days(6);
            let start_ms = day_start_ms(start_day);
            let end_ms = day_start_ms(end_day + Duration::days(1)) - 1;

            let mut clicks = 0;
            let mut conversions = 0;
            for event in events {
                let ms = event.occurred_ms();
                if ms < start_ms || ms > end_ms {
                    continue;
                }
                if event.is_click_like() {
                    clicks += 1;
                }
                if settings.is_contact_click(event) {
                    conversions += 1;
                }
            }

            WeeklyTrendPoint {
                label: day_label(start_day),
                clicks,
                conversions,
            }
        })
        .collect()
}
