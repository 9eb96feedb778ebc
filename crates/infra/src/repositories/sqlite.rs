//! SQLite-backed implementations of the storage ports. All repositories
//! share one connection behind an async mutex; statements are short enough
//! that holding the lock across a call is fine.

use std::sync::Arc;

use domus_domain::DomainResult;
use domus_domain::audit::AuditEvent;
use domus_domain::chat::{ChatMessage, ChatThread, ReadMark};
use domus_domain::error::DomainError;
use domus_domain::listing::{DealStatus, NewDeal, PropertyRef, PropertyStatus, UserRef};
use domus_domain::ports::BoxFuture;
use domus_domain::ports::audit::AuditSink;
use domus_domain::ports::chat::ChatRepository;
use domus_domain::ports::deal::DealSink;
use domus_domain::ports::directory::{PropertyDirectory, UserDirectory};
use domus_domain::ports::read_store::ReadMarkStore;
use domus_domain::util::{now_ms, uuid_v7_without_dashes};
use metrics::counter;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;

const READ_STORE_SELF_HEAL_TOTAL: &str = "domus_read_store_self_heal_total";

fn storage(err: rusqlite::Error) -> DomainError {
    DomainError::Storage(err.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn is_missing_reads_table(err: &rusqlite::Error) -> bool {
    err.to_string().contains("no such table: chat_reads")
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<ChatThread> {
    Ok(ChatThread {
        thread_id: row.get(0)?,
        property_id: row.get(1)?,
        buyer_id: row.get(2)?,
        seller_id: row.get(3)?,
        deal_id: row.get(4)?,
        created_at_ms: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        message_id: row.get(0)?,
        thread_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        sent_at_ms: row.get(4)?,
    })
}

const THREAD_COLUMNS: &str = "id, property_id, buyer_id, seller_id, deal_id, created_at_ms";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, body, sent_at_ms";

pub struct SqliteChatRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChatRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl ChatRepository for SqliteChatRepository {
    fn create_thread(&self, thread: &ChatThread) -> BoxFuture<'_, DomainResult<ChatThread>> {
        let thread = thread.clone();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let result = conn.execute(
                "INSERT INTO chat_threads (id, property_id, buyer_id, seller_id, deal_id, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread.thread_id,
                    thread.property_id,
                    thread.buyer_id,
                    thread.seller_id,
                    thread.deal_id,
                    thread.created_at_ms,
                ],
            );
            match result {
                Ok(_) => Ok(thread),
                Err(err) if is_constraint_violation(&err) => Err(DomainError::Conflict),
                Err(err) => Err(storage(err)),
            }
        })
    }

    fn get_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatThread>>> {
        let thread_id = thread_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM chat_threads WHERE id = ?1"),
                params![thread_id],
                thread_from_row,
            )
            .optional()
            .map_err(storage)
        })
    }

    fn find_thread_by_triple(
        &self,
        property_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<ChatThread>>> {
        let property_id = property_id.to_string();
        let buyer_id = buyer_id.to_string();
        let seller_id = seller_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.query_row(
                &format!(
                    "SELECT {THREAD_COLUMNS} FROM chat_threads
                     WHERE property_id = ?1 AND buyer_id = ?2 AND seller_id = ?3"
                ),
                params![property_id, buyer_id, seller_id],
                thread_from_row,
            )
            .optional()
            .map_err(storage)
        })
    }

    fn list_threads_by_property(
        &self,
        property_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<ChatThread>>> {
        let property_id = property_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {THREAD_COLUMNS} FROM chat_threads
                     WHERE property_id = ?1 ORDER BY created_at_ms"
                ))
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![property_id], thread_from_row)
                .map_err(storage)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
        })
    }

    fn list_threads_by_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<ChatThread>>> {
        let user_id = user_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {THREAD_COLUMNS} FROM chat_threads
                     WHERE buyer_id = ?1 OR seller_id = ?1 ORDER BY created_at_ms"
                ))
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![user_id], thread_from_row)
                .map_err(storage)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
        })
    }

    fn delete_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let thread_id = thread_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let mut conn = conn.lock().await;
            let tx = conn.transaction().map_err(storage)?;
            tx.execute(
                "DELETE FROM chat_messages WHERE chat_id = ?1",
                params![thread_id],
            )
            .map_err(storage)?;
            // The reads table may not exist yet on a fresh store.
            if let Err(err) = tx.execute(
                "DELETE FROM chat_reads WHERE chat_id = ?1",
                params![thread_id],
            ) {
                if !is_missing_reads_table(&err) {
                    return Err(storage(err));
                }
            }
            let deleted = tx
                .execute("DELETE FROM chat_threads WHERE id = ?1", params![thread_id])
                .map_err(storage)?;
            if deleted == 0 {
                return Err(DomainError::NotFound);
            }
            tx.commit().map_err(storage)
        })
    }

    fn link_deal(&self, thread_id: &str, deal_id: &str) -> BoxFuture<'_, DomainResult<ChatThread>> {
        let thread_id = thread_id.to_string();
        let deal_id = deal_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.execute(
                "UPDATE chat_threads SET deal_id = ?2 WHERE id = ?1 AND deal_id IS NULL",
                params![thread_id, deal_id],
            )
            .map_err(storage)?;
            conn.query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM chat_threads WHERE id = ?1"),
                params![thread_id],
                thread_from_row,
            )
            .optional()
            .map_err(storage)?
            .ok_or(DomainError::NotFound)
        })
    }

    fn append_message(&self, message: &ChatMessage) -> BoxFuture<'_, DomainResult<ChatMessage>> {
        let message = message.clone();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let result = conn.execute(
                "INSERT INTO chat_messages (id, chat_id, sender_id, body, sent_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.message_id,
                    message.thread_id,
                    message.sender_id,
                    message.body,
                    message.sent_at_ms,
                ],
            );
            match result {
                Ok(_) => Ok(message),
                // Foreign key failure: the thread is gone.
                Err(err) if is_constraint_violation(&err) => Err(DomainError::NotFound),
                Err(err) => Err(storage(err)),
            }
        })
    }

    fn list_messages(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
        let thread_id = thread_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                     WHERE chat_id = ?1 ORDER BY sent_at_ms ASC, id ASC"
                ))
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![thread_id], message_from_row)
                .map_err(storage)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
        })
    }
}

/// Read-mark store with a self-healing table: if `chat_reads` is missing
/// at call time the statement is retried once after recreating it. The
/// startup migration makes this a rare path, kept for stores created by
/// older deployments.
pub struct SqliteReadMarkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReadMarkStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn ensure_reads_table(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_reads (
                chat_id         TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                last_read_at_ms INTEGER NOT NULL,
                UNIQUE (chat_id, user_id)
            );",
        )
    }

    fn upsert(conn: &Connection, chat_id: &str, user_id: &str, at_ms: i64) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO chat_reads (chat_id, user_id, last_read_at_ms)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (chat_id, user_id)
             DO UPDATE SET last_read_at_ms = MAX(last_read_at_ms, excluded.last_read_at_ms)",
            params![chat_id, user_id, at_ms],
        )?;
        conn.query_row(
            "SELECT last_read_at_ms FROM chat_reads WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id, user_id],
            |row| row.get(0),
        )
    }

    fn heal_and_retry<T>(
        conn: &Connection,
        first: rusqlite::Result<T>,
        retry: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DomainResult<T> {
        match first {
            Ok(value) => Ok(value),
            Err(err) if is_missing_reads_table(&err) => {
                tracing::warn!("chat_reads table missing, recreating");
                counter!(READ_STORE_SELF_HEAL_TOTAL).increment(1);
                Self::ensure_reads_table(conn).map_err(storage)?;
                retry(conn).map_err(storage)
            }
            Err(err) => Err(storage(err)),
        }
    }
}

impl ReadMarkStore for SqliteReadMarkStore {
    fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<ReadMark>> {
        let chat_id = chat_id.to_string();
        let user_id = user_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let stored = Self::heal_and_retry(
                &conn,
                Self::upsert(&conn, &chat_id, &user_id, at_ms),
                |conn| Self::upsert(conn, &chat_id, &user_id, at_ms),
            )?;
            Ok(ReadMark {
                thread_id: chat_id,
                user_id,
                last_read_at_ms: stored,
            })
        })
    }

    fn get_last_read(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        let chat_id = chat_id.to_string();
        let user_id = user_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let lookup = |conn: &Connection| {
                conn.query_row(
                    "SELECT last_read_at_ms FROM chat_reads
                     WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id, user_id],
                    |row| row.get(0),
                )
                .optional()
            };
            Self::heal_and_retry(&conn, lookup(&conn), lookup)
        })
    }
}

fn property_status_from_str(value: &str) -> PropertyStatus {
    match value {
        "sold" => PropertyStatus::Sold,
        "archived" => PropertyStatus::Archived,
        "active" => PropertyStatus::Active,
        other => {
            tracing::warn!(status = other, "unknown property status, treating as active");
            PropertyStatus::Active
        }
    }
}

fn deal_status_str(status: DealStatus) -> &'static str {
    match status {
        DealStatus::Pending => "pending",
        DealStatus::Approved => "approved",
        DealStatus::Rejected => "rejected",
    }
}

pub struct SqlitePropertyDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePropertyDirectory {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl PropertyDirectory for SqlitePropertyDirectory {
    fn get_property(&self, property_id: &str) -> BoxFuture<'_, DomainResult<Option<PropertyRef>>> {
        let property_id = property_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.query_row(
                "SELECT id, owner_id, realtor_id, status, address
                 FROM properties WHERE id = ?1",
                params![property_id],
                |row| {
                    Ok(PropertyRef {
                        property_id: row.get(0)?,
                        owner_id: row.get(1)?,
                        realtor_id: row.get(2)?,
                        status: property_status_from_str(&row.get::<_, String>(3)?),
                        address: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(storage)
        })
    }

    fn assign_owner(&self, property_id: &str, owner_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let property_id = property_id.to_string();
        let owner_id = owner_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            let updated = conn
                .execute(
                    "UPDATE properties SET owner_id = ?2 WHERE id = ?1",
                    params![property_id, owner_id],
                )
                .map_err(storage)?;
            if updated == 0 {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }
}

pub struct SqliteUserDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserDirectory {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl UserDirectory for SqliteUserDirectory {
    fn get_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserRef>>> {
        let user_id = user_id.to_string();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.query_row(
                "SELECT id, email, first_name, last_name FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRef {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(storage)
        })
    }
}

pub struct SqliteDealSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDealSink {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl DealSink for SqliteDealSink {
    fn create_deal(&self, deal: &NewDeal) -> BoxFuture<'_, DomainResult<String>> {
        let deal = deal.clone();
        let conn = self.conn.clone();
        Box::pin(async move {
            let deal_id = uuid_v7_without_dashes();
            let conn = conn.lock().await;
            conn.execute(
                "INSERT INTO deals (id, property_id, buyer_id, seller_id, realtor_id, status, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    deal_id,
                    deal.property_id,
                    deal.buyer_id,
                    deal.seller_id,
                    deal.realtor_id,
                    deal_status_str(deal.status),
                    now_ms(),
                ],
            )
            .map_err(storage)?;
            Ok(deal_id)
        })
    }
}

pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: &AuditEvent) -> BoxFuture<'_, DomainResult<()>> {
        let event = event.clone();
        let conn = self.conn.clone();
        Box::pin(async move {
            let conn = conn.lock().await;
            conn.execute(
                "INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, details, payload_hash, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.event_id,
                    event.actor_id,
                    event.action,
                    event.entity_type,
                    event.entity_id,
                    event.details,
                    event.payload_hash,
                    event.created_at_ms,
                ],
            )
            .map_err(storage)?;
            Ok(())
        })
    }
}
