//! Hash-map backed implementations of the storage ports. Default backend
//! for tests and local development; semantics mirror the sqlite backend,
//! including the (property, buyer, seller) uniqueness and the
//! never-backward read marks.

use std::collections::HashMap;
use std::sync::Arc;

use domus_domain::DomainResult;
use domus_domain::audit::AuditEvent;
use domus_domain::chat::{ChatMessage, ChatThread, ReadMark};
use domus_domain::error::DomainError;
use domus_domain::listing::{NewDeal, PropertyRef, UserRef};
use domus_domain::ports::BoxFuture;
use domus_domain::ports::audit::AuditSink;
use domus_domain::ports::chat::ChatRepository;
use domus_domain::ports::deal::DealSink;
use domus_domain::ports::directory::{PropertyDirectory, UserDirectory};
use domus_domain::ports::read_store::ReadMarkStore;
use domus_domain::util::uuid_v7_without_dashes;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryChatRepository {
    threads: Arc<RwLock<HashMap<String, ChatThread>>>,
    by_triple: Arc<RwLock<HashMap<(String, String, String), String>>>,
    messages: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn triple_key(thread: &ChatThread) -> (String, String, String) {
    (
        thread.property_id.clone().unwrap_or_default(),
        thread.buyer_id.clone(),
        thread.seller_id.clone(),
    )
}

impl ChatRepository for InMemoryChatRepository {
    fn create_thread(&self, thread: &ChatThread) -> BoxFuture<'_, DomainResult<ChatThread>> {
        let thread = thread.clone();
        let threads = self.threads.clone();
        let by_triple = self.by_triple.clone();
        Box::pin(async move {
            let mut by_triple = by_triple.write().await;
            let key = triple_key(&thread);
            if by_triple.contains_key(&key) {
                return Err(DomainError::Conflict);
            }
            let mut threads = threads.write().await;
            by_triple.insert(key, thread.thread_id.clone());
            threads.insert(thread.thread_id.clone(), thread.clone());
            Ok(thread)
        })
    }

    fn get_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatThread>>> {
        let thread_id = thread_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move { Ok(threads.read().await.get(&thread_id).cloned()) })
    }

    fn find_thread_by_triple(
        &self,
        property_id: &str,
        buyer_id: &str,
        seller_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<ChatThread>>> {
        let key = (
            property_id.to_string(),
            buyer_id.to_string(),
            seller_id.to_string(),
        );
        let by_triple = self.by_triple.clone();
        let threads = self.threads.clone();
        Box::pin(async move {
            let by_triple = by_triple.read().await;
            let Some(thread_id) = by_triple.get(&key) else {
                return Ok(None);
            };
            Ok(threads.read().await.get(thread_id).cloned())
        })
    }

    fn list_threads_by_property(
        &self,
        property_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<ChatThread>>> {
        let property_id = property_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move {
            let threads = threads.read().await;
            Ok(threads
                .values()
                .filter(|thread| thread.property_id.as_deref() == Some(&property_id))
                .cloned()
                .collect())
        })
    }

    fn list_threads_by_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<ChatThread>>> {
        let user_id = user_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move {
            let threads = threads.read().await;
            Ok(threads
                .values()
                .filter(|thread| thread.is_participant(&user_id))
                .cloned()
                .collect())
        })
    }

    fn delete_thread(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let thread_id = thread_id.to_string();
        let threads = self.threads.clone();
        let by_triple = self.by_triple.clone();
        let messages = self.messages.clone();
        Box::pin(async move {
            let mut by_triple = by_triple.write().await;
            let mut threads = threads.write().await;
            let Some(thread) = threads.remove(&thread_id) else {
                return Err(DomainError::NotFound);
            };
            by_triple.remove(&triple_key(&thread));
            messages.write().await.remove(&thread_id);
            Ok(())
        })
    }

    fn link_deal(&self, thread_id: &str, deal_id: &str) -> BoxFuture<'_, DomainResult<ChatThread>> {
        let thread_id = thread_id.to_string();
        let deal_id = deal_id.to_string();
        let threads = self.threads.clone();
        Box::pin(async move {
            let mut threads = threads.write().await;
            let thread = threads.get_mut(&thread_id).ok_or(DomainError::NotFound)?;
            if thread.deal_id.is_none() {
                thread.deal_id = Some(deal_id);
            }
            Ok(thread.clone())
        })
    }

    fn append_message(&self, message: &ChatMessage) -> BoxFuture<'_, DomainResult<ChatMessage>> {
        let message = message.clone();
        let threads = self.threads.clone();
        let messages = self.messages.clone();
        Box::pin(async move {
            if !threads.read().await.contains_key(&message.thread_id) {
                return Err(DomainError::NotFound);
            }
            let mut messages = messages.write().await;
            messages
                .entry(message.thread_id.clone())
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }

    fn list_messages(&self, thread_id: &str) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
        let thread_id = thread_id.to_string();
        let messages = self.messages.clone();
        Box::pin(async move {
            let messages = messages.read().await;
            let mut output = messages.get(&thread_id).cloned().unwrap_or_default();
            output.sort_by(|a, b| {
                a.sent_at_ms
                    .cmp(&b.sent_at_ms)
                    .then_with(|| a.message_id.cmp(&b.message_id))
            });
            Ok(output)
        })
    }
}

#[derive(Default)]
pub struct InMemoryReadMarkStore {
    marks: Arc<RwLock<HashMap<(String, String), i64>>>,
}

impl InMemoryReadMarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadMarkStore for InMemoryReadMarkStore {
    fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<ReadMark>> {
        let key = (chat_id.to_string(), user_id.to_string());
        let marks = self.marks.clone();
        Box::pin(async move {
            let mut marks = marks.write().await;
            let stored = marks
                .entry(key.clone())
                .and_modify(|existing| *existing = (*existing).max(at_ms))
                .or_insert(at_ms);
            Ok(ReadMark {
                thread_id: key.0,
                user_id: key.1,
                last_read_at_ms: *stored,
            })
        })
    }

    fn get_last_read(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        let key = (chat_id.to_string(), user_id.to_string());
        let marks = self.marks.clone();
        Box::pin(async move { Ok(marks.read().await.get(&key).copied()) })
    }
}

#[derive(Default)]
pub struct InMemoryPropertyDirectory {
    properties: Arc<RwLock<HashMap<String, PropertyRef>>>,
}

impl InMemoryPropertyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, property: PropertyRef) {
        self.properties
            .write()
            .await
            .insert(property.property_id.clone(), property);
    }
}

impl PropertyDirectory for InMemoryPropertyDirectory {
    fn get_property(&self, property_id: &str) -> BoxFuture<'_, DomainResult<Option<PropertyRef>>> {
        let property_id = property_id.to_string();
        let properties = self.properties.clone();
        Box::pin(async move { Ok(properties.read().await.get(&property_id).cloned()) })
    }

    fn assign_owner(&self, property_id: &str, owner_id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let property_id = property_id.to_string();
        let owner_id = owner_id.to_string();
        let properties = self.properties.clone();
        Box::pin(async move {
            let mut properties = properties.write().await;
            let property = properties
                .get_mut(&property_id)
                .ok_or(DomainError::NotFound)?;
            property.owner_id = Some(owner_id);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserRef>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: UserRef) {
        self.users.write().await.insert(user.user_id.clone(), user);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn get_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserRef>>> {
        let user_id = user_id.to_string();
        let users = self.users.clone();
        Box::pin(async move { Ok(users.read().await.get(&user_id).cloned()) })
    }
}

#[derive(Default)]
pub struct InMemoryDealSink {
    deals: Arc<RwLock<HashMap<String, NewDeal>>>,
}

impl InMemoryDealSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn created_count(&self) -> usize {
        self.deals.read().await.len()
    }
}

impl DealSink for InMemoryDealSink {
    fn create_deal(&self, deal: &NewDeal) -> BoxFuture<'_, DomainResult<String>> {
        let deal = deal.clone();
        let deals = self.deals.clone();
        Box::pin(async move {
            let deal_id = uuid_v7_without_dashes();
            deals.write().await.insert(deal_id.clone(), deal);
            Ok(deal_id)
        })
    }
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> BoxFuture<'_, DomainResult<()>> {
        let event = event.clone();
        let events = self.events.clone();
        Box::pin(async move {
            events.write().await.push(event);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_domain::util::now_ms;

    fn thread(id: &str, property: &str, buyer: &str, seller: &str) -> ChatThread {
        ChatThread {
            thread_id: id.to_string(),
            property_id: Some(property.to_string()),
            buyer_id: buyer.to_string(),
            seller_id: seller.to_string(),
            deal_id: None,
            created_at_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn duplicate_triple_is_a_conflict() {
        let repo = InMemoryChatRepository::new();
        repo.create_thread(&thread("t1", "p1", "b1", "s1"))
            .await
            .expect("first");
        let err = repo
            .create_thread(&thread("t2", "p1", "b1", "s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
    }

    #[tokio::test]
    async fn link_deal_is_set_once() {
        let repo = InMemoryChatRepository::new();
        repo.create_thread(&thread("t1", "p1", "b1", "s1"))
            .await
            .expect("create");
        let first = repo.link_deal("t1", "deal-a").await.expect("link");
        assert_eq!(first.deal_id.as_deref(), Some("deal-a"));
        let second = repo.link_deal("t1", "deal-b").await.expect("relink");
        assert_eq!(second.deal_id.as_deref(), Some("deal-a"));
    }

    #[tokio::test]
    async fn read_marks_never_move_backward() {
        let store = InMemoryReadMarkStore::new();
        store.mark_read("c1", "u1", 500).await.expect("mark");
        let stale = store.mark_read("c1", "u1", 100).await.expect("stale");
        assert_eq!(stale.last_read_at_ms, 500);
        assert_eq!(store.get_last_read("c1", "u1").await.unwrap(), Some(500));
    }
}
