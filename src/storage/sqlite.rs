use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::storage::EventBackend;
use crate::types::{AnalyticsEvent, EventMeta, Source};
use chrono::DateTime;
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::{params, Connection, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply performance PRAGMAs to a SQLite connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -16384;
        PRAGMA temp_store = MEMORY;
        PRAGMA wal_autocheckpoint = 1000;
        ",
    )
}

/// Create a deadpool-sqlite connection pool. No connection is opened yet.
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, deadpool_sqlite::CreatePoolError> {
    let db_path = config.path.clone();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            if let Err(e) =
                std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "failed to set database file permissions");
            }
        }
    }

    let mut cfg = Config::new(db_path);
    cfg.pool = Some(PoolConfig::new(config.pool_size.max(1)));
    cfg.create_pool(Runtime::Tokio1)
}

const INSERT_EVENT: &str = "INSERT INTO analytics_events (
        occurred_at, occurred_at_ms, event_name, session_id, path, source,
        source_context, label, href, section, item_id, item_type,
        value, duration_ms, is_bot, meta
    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)";

const SELECT_RECENT: &str = "SELECT
        occurred_at_ms, event_name, session_id, path, source,
        source_context, label, href, section, item_id, item_type,
        value, duration_ms, is_bot, meta
    FROM analytics_events
    ORDER BY occurred_at_ms DESC, id DESC
    LIMIT ?1";

/// Relational event backend. The table is created on first use, so a
/// database that appears after startup is picked up without a restart.
/// Callers racing on a cold pool wait for a single schema setup.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool,
    schema: Arc<OnceCell<()>>,
}

impl SqliteBackend {
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = create_pool(config).map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        })
    }

    /// Pragmas and migrations, once per backend. A failed attempt leaves the
    /// cell empty so the next call retries.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                let conn = self.pool.get().await?;
                conn.interact(|conn| -> Result<(), StoreError> {
                    conn.busy_timeout(BUSY_TIMEOUT)?;
                    apply_pragmas(conn)?;
                    crate::storage::migrations::run_migrations(conn)?;
                    Ok(())
                })
                .await?
            })
            .await?;
        Ok(())
    }

    /// Run `f` on a pooled connection inside the blocking pool, making sure
    /// the schema exists first.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_schema().await?;
        let conn = self.pool.get().await?;
        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await?
    }

    pub async fn ping(&self) -> bool {
        self.with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await
        .is_ok()
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Option<AnalyticsEvent>> {
    let occurred_ms: i64 = row.get(0)?;
    let Some(occurred_at) = DateTime::from_timestamp_millis(occurred_ms) else {
        return Ok(None);
    };
    let source: String = row.get(4)?;
    let meta: String = row.get(14)?;
    let Ok(meta) = serde_json::from_str::<EventMeta>(&meta) else {
        return Ok(None);
    };

    Ok(Some(AnalyticsEvent {
        occurred_at,
        event_name: row.get(1)?,
        session_id: row.get(2)?,
        path: row.get(3)?,
        source: Source::parse(&source),
        source_context: row.get(5)?,
        label: row.get(6)?,
        href: row.get(7)?,
        section: row.get(8)?,
        item_id: row.get(9)?,
        item_type: row.get(10)?,
        value: row.get(11)?,
        duration_ms: row.get(12)?,
        is_bot: row.get(13)?,
        meta,
    }))
}

impl EventBackend for SqliteBackend {
    async fn append(&self, event: &AnalyticsEvent) -> Result<(), StoreError> {
        let meta = serde_json::to_string(&event.meta)?;
        let event = event.clone();
        self.with_conn(move |conn| {
            conn.execute(
                INSERT_EVENT,
                params![
                    crate::types::iso_millis::format(&event.occurred_at),
                    event.occurred_ms(),
                    event.event_name,
                    event.session_id,
                    event.path,
                    event.source.as_str(),
                    event.source_context,
                    event.label,
                    event.href,
                    event.section,
                    event.item_id,
                    event.item_type,
                    event.value,
                    event.duration_ms,
                    event.is_bot,
                    meta,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn read_recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(SELECT_RECENT)?;
            let rows = stmt.query_map([limit as i64], row_to_event)?;
            let mut events = Vec::new();
            for row in rows {
                if let Some(event) = row? {
                    events.push(event);
                }
            }
            Ok(events)
        })
        .await
    }
}
