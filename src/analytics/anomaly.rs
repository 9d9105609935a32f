use crate::analytics::stats::{mean, std_dev};
use crate::analytics::types::{ConversionFunnel, TimePoint};
use crate::analytics::SummarySettings;

pub const SPIKE_ALERT: &str = "Traffic spike detected in the latest hour compared with baseline.";
pub const BOT_SHARE_ALERT: &str =
    "High bot share detected. Review filters before making traffic decisions.";

fn contact_rate_alert(floor_pct: f64) -> String {
    format!("Contact conversion from section view to click is below {floor_pct}%.")
}

/// Latest hour against the mean and population deviation of the hours before it.
fn is_spike(hourly: &[TimePoint], settings: &SummarySettings) -> bool {
    let Some((latest, baseline)) = hourly.split_last() else {
        return false;
    };
    if hourly.len() < 6 {
        return false;
    }
    let baseline: Vec<f64> = baseline.iter().map(|p| p.clicks as f64).collect();
    let latest = latest.clicks as f64;
    latest > mean(&baseline) + std_dev(&baseline) * settings.spike_sigma
        && latest > settings.spike_floor as f64
}

pub fn anomaly_alerts(
    hourly: &[TimePoint],
    bot_share_pct: f64,
    funnel: &ConversionFunnel,
    settings: &SummarySettings,
) -> Vec<String> {
    let mut alerts = Vec::new();

    if is_spike(hourly, settings) {
        alerts.push(SPIKE_ALERT.to_string());
    }
    if bot_share_pct > settings.bot_share_alert_pct {
        alerts.push(BOT_SHARE_ALERT.to_string());
    }
    if funnel.contact_to_click_rate < settings.contact_rate_floor_pct
        && funnel.contact_section_sessions > settings.contact_min_sessions
    {
        alerts.push(contact_rate_alert(settings.contact_rate_floor_pct));
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(baseline: u64, latest: u64) -> Vec<TimePoint> {
        let mut points: Vec<TimePoint> = (0..23)
            .map(|i| TimePoint {
                label: format!("{i}"),
                clicks: baseline,
            })
            .collect();
        points.push(TimePoint {
            label: "now".into(),
            clicks: latest,
        });
        points
    }

    #[test]
    fn test_spike_requires_floor() {
        let settings = SummarySettings::default();
        let quiet = ConversionFunnel::default();
        assert_eq!(
            anomaly_alerts(&hours(2, 25), 0.0, &quiet, &settings),
            vec![SPIKE_ALERT.to_string()]
        );
        // Far above baseline but under the absolute floor.
        assert!(anomaly_alerts(&hours(0, 15), 0.0, &quiet, &settings).is_empty());
    }

    #[test]
    fn test_bot_share_and_contact_rate() {
        let settings = SummarySettings::default();
        let funnel = ConversionFunnel {
            contact_section_sessions: 30,
            contact_click_sessions: 2,
            contact_to_click_rate: 6.67,
            ..ConversionFunnel::default()
        };
        let alerts = anomaly_alerts(&hours(1, 1), 40.0, &funnel, &settings);
        assert_eq!(
            alerts,
            vec![
                BOT_SHARE_ALERT.to_string(),
                "Contact conversion from section view to click is below 10%.".to_string(),
            ]
        );

        let small_sample = ConversionFunnel {
            contact_section_sessions: 20,
            ..funnel
        };
        assert!(anomaly_alerts(&hours(1, 1), 35.0, &small_sample, &settings).is_empty());
    }
}
