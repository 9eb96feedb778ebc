use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::audit::audit_event;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::listing::{DealStatus, NewDeal, PropertyStatus, UserRef};
use crate::ports::audit::AuditSink;
use crate::ports::chat::ChatRepository;
use crate::ports::deal::DealSink;
use crate::ports::directory::{PropertyDirectory, UserDirectory};
use crate::ports::read_store::ReadMarkStore;
use crate::unread;
use crate::util::{now_ms, uuid_v7_without_dashes};

const MAX_MESSAGE_LENGTH: usize = 4_000;

/// Two-party conversation anchored to a listing. The buyer opened it; the
/// seller owns (or owned) the listing. At most one thread exists per
/// (property, buyer, seller) triple.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatThread {
    pub thread_id: String,
    pub property_id: Option<String>,
    pub buyer_id: String,
    pub seller_id: String,
    pub deal_id: Option<String>,
    pub created_at_ms: i64,
}

impl ChatThread {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.buyer_id == user_id {
            &self.seller_id
        } else {
            &self.buyer_id
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadMark {
    pub thread_id: String,
    pub user_id: String,
    pub last_read_at_ms: i64,
}

/// Message plus its display read flag for one viewer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub read: bool,
}

/// Listing entry for a user's inbox: thread enriched with the last message,
/// the unread count, and best-effort display data about the counterpart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread: ChatThread,
    pub other_user: Option<UserRef>,
    pub property_address: Option<String>,
    pub last_message: Option<ChatMessage>,
    pub unread_count: u64,
}

impl ThreadSummary {
    pub fn activity_ms(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|message| message.sent_at_ms)
            .unwrap_or(self.thread.created_at_ms)
    }
}

#[derive(Clone)]
pub struct ChatService {
    threads: Arc<dyn ChatRepository>,
    read_marks: Arc<dyn ReadMarkStore>,
    properties: Arc<dyn PropertyDirectory>,
    users: Arc<dyn UserDirectory>,
    deals: Arc<dyn DealSink>,
    audit: Arc<dyn AuditSink>,
    fallback_seller_id: Option<String>,
}

impl ChatService {
    pub fn new(
        threads: Arc<dyn ChatRepository>,
        read_marks: Arc<dyn ReadMarkStore>,
        properties: Arc<dyn PropertyDirectory>,
        users: Arc<dyn UserDirectory>,
        deals: Arc<dyn DealSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            threads,
            read_marks,
            properties,
            users,
            deals,
            audit,
            fallback_seller_id: None,
        }
    }

    /// Assignee for listings that have no owner. External policy, supplied
    /// by configuration; `None` makes ownerless listings unreachable.
    pub fn with_fallback_seller(mut self, fallback_seller_id: Option<String>) -> Self {
        self.fallback_seller_id = fallback_seller_id.filter(|id| !id.is_empty());
        self
    }

    /// A user may act on a thread iff they are its buyer or seller.
    /// Precondition of every operation that takes a chat id.
    pub async fn authorize(&self, chat_id: &str, user_id: &str) -> DomainResult<ChatThread> {
        let thread = self
            .threads
            .get_thread(chat_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if thread.is_participant(user_id) {
            Ok(thread)
        } else {
            Err(DomainError::Forbidden)
        }
    }

    /// First contact between a viewer and a listing. Idempotent: an
    /// existing (property, buyer, seller) thread is returned unchanged, and
    /// a losing race against a concurrent first contact resolves by
    /// fetching the winner. Returns the thread and whether it was created.
    pub async fn create_or_get_thread(
        &self,
        actor: &ActorIdentity,
        property_id: &str,
    ) -> DomainResult<(ChatThread, bool)> {
        let property = self
            .properties
            .get_property(property_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        let viewer = actor.user_id.as_str();

        if property.owner_id.as_deref() == Some(viewer) {
            // The listing owner cannot start a conversation with themself,
            // but may reopen a thread a buyer already started.
            let existing = self.threads.list_threads_by_property(property_id).await?;
            if let Some(thread) = existing
                .into_iter()
                .find(|thread| thread.is_participant(viewer))
            {
                return Ok((thread, false));
            }
            return Err(DomainError::SelfContact);
        }

        let seller_id = match property.owner_id.clone() {
            Some(owner_id) => owner_id,
            None => {
                let Some(fallback) = self.fallback_seller_id.clone() else {
                    return Err(DomainError::NotFound);
                };
                // Adopt the listing so later lookups agree on the seller.
                if let Err(err) = self.properties.assign_owner(property_id, &fallback).await {
                    tracing::warn!(
                        error = %err,
                        property_id,
                        "failed to adopt ownerless listing onto fallback seller"
                    );
                }
                fallback
            }
        };

        if let Some(existing) = self
            .threads
            .find_thread_by_triple(property_id, viewer, &seller_id)
            .await?
        {
            return Ok((existing, false));
        }

        let thread = ChatThread {
            thread_id: uuid_v7_without_dashes(),
            property_id: Some(property_id.to_string()),
            buyer_id: viewer.to_string(),
            seller_id,
            deal_id: None,
            created_at_ms: now_ms(),
        };

        match self.threads.create_thread(&thread).await {
            Ok(created) => {
                self.record_audit(
                    Some(viewer),
                    "CHAT_CREATE",
                    "CHAT",
                    &created.thread_id,
                    &format!("chat opened for property {property_id}"),
                )
                .await;
                Ok((created, true))
            }
            // Concurrent first contact: the other writer won the unique
            // (property, buyer, seller) slot.
            Err(DomainError::Conflict) => self
                .threads
                .find_thread_by_triple(property_id, viewer, &thread.seller_id)
                .await?
                .map(|existing| (existing, false))
                .ok_or(DomainError::Conflict),
            Err(err) => Err(err),
        }
    }

    pub async fn send_message(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
        text: &str,
    ) -> DomainResult<ChatMessage> {
        self.authorize(chat_id, &actor.user_id).await?;
        let body = validate_message_text(text)?;
        let message = ChatMessage {
            message_id: uuid_v7_without_dashes(),
            thread_id: chat_id.to_string(),
            sender_id: actor.user_id.clone(),
            body,
            sent_at_ms: now_ms(),
        };
        self.threads.append_message(&message).await
    }

    /// Ordered messages with read flags for the viewer. Viewing marks the
    /// thread read; read-tracking failures degrade the flags and counts but
    /// never fail the read path.
    pub async fn list_messages(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
    ) -> DomainResult<Vec<MessageView>> {
        let thread = self.authorize(chat_id, &actor.user_id).await?;

        if let Err(err) = self
            .read_marks
            .mark_read(chat_id, &actor.user_id, now_ms())
            .await
        {
            tracing::warn!(
                error = %err,
                chat_id,
                user_id = %actor.user_id,
                "failed to mark thread read while viewing"
            );
        }

        let other_id = thread.other_participant(&actor.user_id).to_string();
        let other_read_at = self.last_read_or_none(chat_id, &other_id).await;
        let messages = self.threads.list_messages(chat_id).await?;
        Ok(unread::message_views(messages, &actor.user_id, other_read_at))
    }

    /// Explicit mark-as-read. Unlike the viewing side effect this
    /// propagates storage failures: the bookkeeping write is the whole
    /// point of the call.
    pub async fn mark_thread_read(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
    ) -> DomainResult<ReadMark> {
        self.authorize(chat_id, &actor.user_id).await?;
        self.read_marks
            .mark_read(chat_id, &actor.user_id, now_ms())
            .await
    }

    pub async fn unread_in_thread(&self, chat_id: &str, viewer_id: &str) -> DomainResult<u64> {
        self.authorize(chat_id, viewer_id).await?;
        let messages = self.threads.list_messages(chat_id).await?;
        let read_at = self.last_read_or_none(chat_id, viewer_id).await;
        Ok(unread::unread_count(&messages, viewer_id, read_at))
    }

    pub async fn unread_total(&self, viewer_id: &str) -> DomainResult<u64> {
        let threads = self.threads.list_threads_by_user(viewer_id).await?;
        let mut total = 0;
        for thread in threads {
            let messages = self.threads.list_messages(&thread.thread_id).await?;
            let read_at = self.last_read_or_none(&thread.thread_id, viewer_id).await;
            total += unread::unread_count(&messages, viewer_id, read_at);
        }
        Ok(total)
    }

    /// Inbox listing: threads with at least one message, newest activity
    /// first. Threads without messages stay retrievable by id but are not
    /// listed.
    pub async fn list_threads_for_user(
        &self,
        actor: &ActorIdentity,
    ) -> DomainResult<Vec<ThreadSummary>> {
        let viewer = actor.user_id.as_str();
        let threads = self.threads.list_threads_by_user(viewer).await?;
        let mut summaries = Vec::with_capacity(threads.len());
        for thread in threads {
            let messages = self.threads.list_messages(&thread.thread_id).await?;
            let Some(last_message) = messages.last().cloned() else {
                continue;
            };
            let read_at = self.last_read_or_none(&thread.thread_id, viewer).await;
            let unread_count = unread::unread_count(&messages, viewer, read_at);

            let other_id = thread.other_participant(viewer).to_string();
            let other_user = match self.users.get_user(&other_id).await {
                Ok(user) => user,
                Err(err) => {
                    tracing::warn!(error = %err, user_id = %other_id, "counterpart lookup failed");
                    None
                }
            };
            let property_address = match &thread.property_id {
                Some(property_id) => match self.properties.get_property(property_id).await {
                    Ok(property) => property.map(|p| p.address),
                    Err(err) => {
                        tracing::warn!(error = %err, property_id, "property lookup failed");
                        None
                    }
                },
                None => None,
            };

            summaries.push(ThreadSummary {
                thread,
                other_user,
                property_address,
                last_message: Some(last_message),
                unread_count,
            });
        }
        summaries.sort_by(|a, b| b.activity_ms().cmp(&a.activity_ms()));
        Ok(summaries)
    }

    /// Prunes an empty thread. Only a participant may delete, and only
    /// while the thread has zero messages.
    pub async fn delete_thread(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<()> {
        let thread = self
            .threads
            .get_thread(chat_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if !thread.is_participant(&actor.user_id) {
            return Err(DomainError::Forbidden);
        }
        let messages = self.threads.list_messages(chat_id).await?;
        if !messages.is_empty() {
            return Err(DomainError::NotEmpty);
        }
        self.threads.delete_thread(chat_id).await?;
        self.record_audit(
            Some(&actor.user_id),
            "CHAT_DELETE",
            "CHAT",
            chat_id,
            "empty chat pruned",
        )
        .await;
        Ok(())
    }

    /// One-time conversion of a chat into a formal deal. Seller-only; the
    /// listing must not be sold. Repeat invocations re-post the pointer
    /// message and return the already-linked deal id.
    pub async fn send_contract(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
    ) -> DomainResult<String> {
        let thread = self
            .threads
            .get_thread(chat_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if thread.seller_id != actor.user_id {
            return Err(DomainError::Forbidden);
        }
        let property_id = thread
            .property_id
            .as_deref()
            .ok_or_else(|| DomainError::Validation("thread has no linked property".into()))?;
        let property = self
            .properties
            .get_property(property_id)
            .await?
            .ok_or_else(|| DomainError::Validation("property not found for thread".into()))?;
        if property.status == PropertyStatus::Sold {
            return Err(DomainError::Validation("property is already sold".into()));
        }

        if let Some(deal_id) = thread.deal_id.clone() {
            self.append_deal_pointer(&thread, actor, &deal_id).await?;
            return Ok(deal_id);
        }

        let deal_id = self
            .deals
            .create_deal(&NewDeal {
                property_id: property_id.to_string(),
                buyer_id: thread.buyer_id.clone(),
                seller_id: thread.seller_id.clone(),
                realtor_id: property.realtor_id.clone(),
                status: DealStatus::Pending,
            })
            .await?;

        // Set-once link; a concurrent handoff that linked first wins and
        // its deal id is the one advertised in the chat.
        let linked = self.threads.link_deal(chat_id, &deal_id).await?;
        let winning_deal_id = linked.deal_id.unwrap_or(deal_id);

        self.append_deal_pointer(&thread, actor, &winning_deal_id)
            .await?;
        self.record_audit(
            Some(&actor.user_id),
            "CHAT_SEND_CONTRACT",
            "DEAL",
            &winning_deal_id,
            &format!("contract sent from chat {chat_id}"),
        )
        .await;
        Ok(winning_deal_id)
    }

    async fn append_deal_pointer(
        &self,
        thread: &ChatThread,
        actor: &ActorIdentity,
        deal_id: &str,
    ) -> DomainResult<ChatMessage> {
        let message = ChatMessage {
            message_id: uuid_v7_without_dashes(),
            thread_id: thread.thread_id.clone(),
            sender_id: actor.user_id.clone(),
            body: format!("Contract sent: /deal/{deal_id}"),
            sent_at_ms: now_ms(),
        };
        self.threads.append_message(&message).await
    }

    async fn last_read_or_none(&self, chat_id: &str, user_id: &str) -> Option<i64> {
        match self.read_marks.get_last_read(chat_id, user_id).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    chat_id,
                    user_id,
                    "read mark lookup failed; treating as never read"
                );
                None
            }
        }
    }

    async fn record_audit(
        &self,
        actor_id: Option<&str>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: &str,
    ) {
        match audit_event(actor_id, action, entity_type, entity_id, details) {
            Ok(event) => {
                if let Err(err) = self.audit.record(&event).await {
                    tracing::warn!(error = %err, action, "audit write failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, action, "audit event build failed");
            }
        }
    }
}

fn validate_message_text(text: &str) -> DomainResult<String> {
    let body = text.trim();
    if body.is_empty() {
        return Err(DomainError::Validation("message text is required".into()));
    }
    if body.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(DomainError::Validation(format!(
            "message text exceeds max length of {MAX_MESSAGE_LENGTH}"
        )));
    }
    Ok(body.to_string())
}
