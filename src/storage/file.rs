use crate::error::StoreError;
use crate::storage::EventBackend;
use crate::types::AnalyticsEvent;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// JSON-array event log on local disk, oldest first. Every append rewrites
/// the whole document; there is no locking between concurrent writers.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    max_events: usize,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, max_events: usize) -> Self {
        Self {
            path: path.into(),
            max_events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Everything on disk in stored order. A missing or corrupt file reads
    /// as empty, and entries that no longer deserialize are skipped.
    async fn load(&self) -> Vec<AnalyticsEvent> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "event file unreadable");
                return Vec::new();
            }
        };

        let entries: Vec<Value> = match serde_json::from_slice(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "event file is not a JSON array");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()
    }

    async fn write_all(&self, events: &[AnalyticsEvent]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(events)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

impl EventBackend for FileBackend {
    async fn append(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        let mut events = self.load().await;
        events.push(event.clone());
        if events.len() > self.max_events {
            let overflow = events.len() - self.max_events;
            events.drain(..overflow);
        }
        self.write_all(&events).await
    }

    async fn read_recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let mut events = self.load().await;
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::{normalize_event, Enrichment};
    use chrono::Utc;
    use serde_json::json;

    fn click(label: &str) -> AnalyticsEvent {
        normalize_event(
            &json!({ "eventName": "click", "label": label, "href": "/apps" }),
            &Enrichment::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_is_field_identical() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested/events.json"), 100);
        let event = click("Apps");

        backend.append(&event).await.unwrap();
        let events = backend.read_recent(100).await.unwrap();
        assert_eq!(events, vec![event]);
    }

    #[tokio::test]
    async fn test_cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("events.json"), 2);
        for label in ["a", "b", "c"] {
            backend.append(&click(label)).await.unwrap();
        }

        let labels: Vec<_> = backend
            .read_recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(labels, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{not json").unwrap();
        let backend = FileBackend::new(&path, 10);

        assert!(backend.read_recent(10).await.unwrap().is_empty());
        backend.append(&click("fresh")).await.unwrap();
        assert_eq!(backend.read_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let good = serde_json::to_value(click("ok")).unwrap();
        let body = json!([{ "eventName": "broken" }, good]);
        std::fs::write(&path, body.to_string()).unwrap();

        let events = FileBackend::new(&path, 10).read_recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "ok");
    }
}
