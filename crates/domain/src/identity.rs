use serde::{Deserialize, Serialize};

/// Explicit caller identity threaded into every chat operation. There is no
/// ambient security context; handlers resolve this once and pass it down.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub user_id: String,
    pub username: String,
}

impl ActorIdentity {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: user_id.clone(),
            username: user_id,
        }
    }
}
