use crate::DomainResult;
use crate::chat::ReadMark;

/// Durable (chat, user) -> last-read-instant map.
///
/// `mark_read` is an upsert keyed on the unique (chat, user) pair and must
/// never move the stored timestamp backward: implementations take
/// `max(existing, at_ms)` rather than overwriting. Failures map to
/// `DomainError::Storage`.
pub trait ReadMarkStore: Send + Sync {
    fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        at_ms: i64,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ReadMark>>;

    fn get_last_read(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<i64>>>;
}
