use std::sync::Arc;

use domus_domain::ports::BoxFuture;
use domus_domain::ports::db::{DbAdapter, DbError};
use rusqlite::Connection;
use tokio::sync::Mutex;

/// Everything the chat engine persists. Applied at startup; every statement
/// is idempotent so re-running against an existing file is safe.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chat_threads (
    id            TEXT PRIMARY KEY,
    property_id   TEXT,
    buyer_id      TEXT NOT NULL,
    seller_id     TEXT NOT NULL,
    deal_id       TEXT,
    created_at_ms INTEGER NOT NULL,
    UNIQUE (property_id, buyer_id, seller_id)
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id         TEXT PRIMARY KEY,
    chat_id    TEXT NOT NULL REFERENCES chat_threads (id),
    sender_id  TEXT NOT NULL,
    body       TEXT NOT NULL,
    sent_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_chat_sent
    ON chat_messages (chat_id, sent_at_ms);

CREATE TABLE IF NOT EXISTS chat_reads (
    chat_id         TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    last_read_at_ms INTEGER NOT NULL,
    UNIQUE (chat_id, user_id)
);

CREATE TABLE IF NOT EXISTS deals (
    id            TEXT PRIMARY KEY,
    property_id   TEXT NOT NULL,
    buyer_id      TEXT NOT NULL,
    seller_id     TEXT NOT NULL,
    realtor_id    TEXT,
    status        TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id            TEXT PRIMARY KEY,
    actor_id      TEXT,
    action        TEXT NOT NULL,
    entity_type   TEXT NOT NULL,
    entity_id     TEXT NOT NULL,
    details       TEXT NOT NULL,
    payload_hash  TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    id         TEXT PRIMARY KEY,
    owner_id   TEXT,
    realtor_id TEXT,
    status     TEXT NOT NULL,
    address    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    email      TEXT NOT NULL,
    first_name TEXT,
    last_name  TEXT
);
";

#[derive(Clone)]
pub struct SqliteAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    pub fn open(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path)
            .map_err(|err| DbError::Unavailable(format!("sqlite open failed: {err}")))?;
        Self::prepare(conn)
    }

    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| DbError::Unavailable(format!("sqlite open failed: {err}")))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, DbError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|err| DbError::Unavailable(format!("sqlite pragma failed: {err}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared handle for the repositories built on this adapter.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(SCHEMA)
            .map_err(|err| DbError::Unavailable(format!("schema migration failed: {err}")))
    }
}

impl DbAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|err| DbError::Unavailable(format!("sqlite ping failed: {err}")))?;
            tracing::debug!("sqlite health check succeeded");
            Ok(())
        })
    }
}

/// Backend for tests and local development; nothing to check.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter;

impl DbAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_applies_and_is_idempotent() {
        let adapter = SqliteAdapter::in_memory().expect("open");
        adapter.ensure_schema().await.expect("first run");
        adapter.ensure_schema().await.expect("second run");
        adapter.health_check().await.expect("healthy");
    }
}
