use crate::error::DomainError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn immutable_event_hash<T>(value: &T) -> crate::DomainResult<String>
where
    T: Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|err| {
        DomainError::Validation(format!("failed to serialize audit payload: {err}"))
    })?;
    let digest = Sha256::digest(&payload);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v7_is_dashless_and_sortable() {
        let a = uuid_v7_without_dashes();
        let b = uuid_v7_without_dashes();
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
        assert!(a <= b);
    }

    #[test]
    fn event_hash_is_stable() {
        let first = immutable_event_hash(&serde_json::json!({"a": 1})).expect("hash");
        let second = immutable_event_hash(&serde_json::json!({"a": 1})).expect("hash");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
