use crate::DomainResult;
use crate::chat::{ChatMessage, ChatThread};

/// Durable store for threads and their messages. Implementations must
/// enforce the (property, buyer, seller) uniqueness at the storage level
/// and surface a violation as `DomainError::Conflict` so callers can treat
/// it as "fetch existing".
pub trait ChatRepository: Send + Sync {
    fn create_thread(
        &self,
        thread: &ChatThread,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ChatThread>>;

    fn get_thread(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ChatThread>>>;

    fn find_thread_by_triple(
        &self,
        property_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<ChatThread>>>;

    fn list_threads_by_property(
        &self,
        property_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ChatThread>>>;

    fn list_threads_by_user(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ChatThread>>>;

    /// Removes the thread together with its messages and read marks.
    fn delete_thread(&self, thread_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    /// Links a deal to the thread if none is linked yet and returns the
    /// stored thread. The link is set-once: an existing link wins and is
    /// returned unchanged.
    fn link_deal(
        &self,
        thread_id: &str,
        deal_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ChatThread>>;

    fn append_message(
        &self,
        message: &ChatMessage,
    ) -> crate::ports::BoxFuture<'_, DomainResult<ChatMessage>>;

    /// Messages in ascending send order, ties broken by message id
    /// (UUIDv7, so id order is insertion order).
    fn list_messages(
        &self,
        thread_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ChatMessage>>>;
}
