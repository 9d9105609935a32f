use crate::error::StoreError;
use crate::storage::sqlite::SqliteBackend;
use rusqlite::params;
use std::time::Duration;
use tokio::time;

/// Background task that keeps the events table at or under `max_events`.
/// The file backend trims on every write and needs no equivalent.
pub async fn retention_loop(backend: SqliteBackend, max_events: usize, interval_secs: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match run_retention_once(&backend, max_events).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, max_events, "pruned oldest analytics events");
                }
            }
            Err(e) => tracing::error!(error = %e, "retention prune failed"),
        }
    }
}

/// Delete every row outside the newest `max_events`. Returns rows deleted.
pub async fn run_retention_once(
    backend: &SqliteBackend,
    max_events: usize,
) -> Result<usize, StoreError> {
    backend
        .with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM analytics_events WHERE id NOT IN (
                    SELECT id FROM analytics_events
                    ORDER BY occurred_at_ms DESC, id DESC
                    LIMIT ?1
                )",
                params![max_events as i64],
            )?;

            if deleted > 10_000 {
                let _ = conn.execute_batch("VACUUM");
            }
            Ok(deleted)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::storage::EventBackend;
    use crate::types::{AnalyticsEvent, EventMeta, Source};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn event_at(offset_minutes: i64) -> AnalyticsEvent {
        AnalyticsEvent {
            occurred_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
                + ChronoDuration::minutes(offset_minutes),
            event_name: format!("event_{offset_minutes}"),
            session_id: "s".into(),
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
        }
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(&DatabaseConfig {
            path: dir.path().join("events.db"),
            pool_size: 1,
        })
        .unwrap();
        for offset in [5, 1, 4, 2, 3] {
            backend.append(&event_at(offset)).await.unwrap();
        }

        let deleted = run_retention_once(&backend, 3).await.unwrap();
        assert_eq!(deleted, 2);

        let names: Vec<_> = backend
            .read_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_name)
            .collect();
        assert_eq!(names, vec!["event_5", "event_4", "event_3"]);

        assert_eq!(run_retention_once(&backend, 3).await.unwrap(), 0);
    }
}
