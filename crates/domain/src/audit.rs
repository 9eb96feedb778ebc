use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::util::{immutable_event_hash, now_ms, uuid_v7_without_dashes};

/// Best-effort audit record. Writes are fire-and-forget; a failed audit
/// write must never fail the operation that produced it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_id: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: String,
    pub payload_hash: String,
    pub created_at_ms: i64,
}

#[derive(Serialize)]
struct AuditPayload<'a> {
    actor_id: Option<&'a str>,
    action: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    details: &'a str,
}

pub fn audit_event(
    actor_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: &str,
) -> DomainResult<AuditEvent> {
    let payload_hash = immutable_event_hash(&AuditPayload {
        actor_id,
        action,
        entity_type,
        entity_id,
        details,
    })?;
    Ok(AuditEvent {
        event_id: uuid_v7_without_dashes(),
        actor_id: actor_id.map(str::to_string),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        details: details.to_string(),
        payload_hash,
        created_at_ms: now_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_event_hashes_payload() {
        let event = audit_event(
            Some("user-1"),
            "CHAT_SEND_CONTRACT",
            "DEAL",
            "deal-1",
            "contract sent from chat chat-1",
        )
        .expect("event");
        assert_eq!(event.payload_hash.len(), 64);
        assert_eq!(event.actor_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn identical_payloads_share_a_hash() {
        let a = audit_event(None, "CHAT_DELETE", "CHAT", "c-1", "").expect("a");
        let b = audit_event(None, "CHAT_DELETE", "CHAT", "c-1", "").expect("b");
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_ne!(a.event_id, b.event_id);
    }
}
