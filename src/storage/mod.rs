pub mod file;
pub mod migrations;
pub mod retention;
pub mod sqlite;

use crate::config::AppConfig;
use crate::error::StoreError;
use crate::types::AnalyticsEvent;
use file::FileBackend;
use sqlite::SqliteBackend;

/// A place events can be appended to and read back from.
#[allow(async_fn_in_trait)]
pub trait EventBackend {
    async fn append(&self, event: &AnalyticsEvent) -> Result<(), StoreError>;

    /// Up to `limit` most recent events, newest first.
    async fn read_recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError>;
}

/// Database-preferred event store with a JSON-file fallback.
///
/// The backend is chosen per call: when SQLite is configured each append and
/// each read tries it first and drops to the file on any error. Nothing is
/// remembered between calls, so during an outage a write can land in the file
/// while a later read is served from the database again.
pub struct EventStore {
    sqlite: Option<SqliteBackend>,
    file: FileBackend,
    max_events: usize,
}

impl EventStore {
    pub fn new(sqlite: Option<SqliteBackend>, file: FileBackend, max_events: usize) -> Self {
        Self {
            sqlite,
            file,
            max_events,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let sqlite = config.database.as_ref().and_then(|db| {
            SqliteBackend::new(db)
                .map_err(|e| {
                    tracing::warn!(error = %e, "database unavailable, using event file only");
                })
                .ok()
        });
        let file = FileBackend::new(&config.storage.file_path, config.storage.max_events);
        Self::new(sqlite, file, config.storage.max_events)
    }

    pub fn sqlite(&self) -> Option<&SqliteBackend> {
        self.sqlite.as_ref()
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Persist one event. Returns `false` only when every backend failed.
    pub async fn append(&self, event: &AnalyticsEvent) -> bool {
        if let Some(sqlite) = &self.sqlite {
            match sqlite.append(event).await {
                Ok(()) => return true,
                Err(e) => tracing::warn!(error = %e, "database append failed, falling back to file"),
            }
        }

        match self.file.append(event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    path = %self.file.path().display(),
                    error = %e,
                    "failed to persist analytics event"
                );
                false
            }
        }
    }

    /// The newest `max_events` events, newest first. Never fails: a broken
    /// file reads as empty.
    pub async fn read_all(&self) -> Vec<AnalyticsEvent> {
        if let Some(sqlite) = &self.sqlite {
            match sqlite.read_recent(self.max_events).await {
                Ok(events) => return events,
                Err(e) => tracing::warn!(error = %e, "database read failed, falling back to file"),
            }
        }

        self.file
            .read_recent(self.max_events)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "event file read failed");
                Vec::new()
            })
    }

    /// `None` when no database is configured.
    pub async fn database_ok(&self) -> Option<bool> {
        match &self.sqlite {
            Some(sqlite) => Some(sqlite.ping().await),
            None => None,
        }
    }
}
