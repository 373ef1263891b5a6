use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token row. The `parent` column holds the wire string of the
/// token this one was swapped from; `None` marks a family root. Tokens are
/// revoked exactly once and never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    /// Opaque high-entropy wire token presented by clients.
    pub token: String,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub revoked: bool,
    pub parent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    /// First token of a new family, created when a session is granted.
    pub fn root(user_id: Uuid, session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token: generate_token_string(),
            user_id,
            session_id,
            revoked: false,
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Child minted by a swap; the prior token's wire string becomes the
    /// parent reference.
    pub fn child_of(prior: &RefreshToken) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token: generate_token_string(),
            user_id: prior.user_id,
            session_id: prior.session_id,
            revoked: false,
            parent: Some(prior.token.clone()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generate an opaque wire token: 32 bytes of OS randomness, hex-encoded.
pub fn generate_token_string() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_token_has_no_parent() {
        let token = RefreshToken::root(Uuid::new_v4(), Uuid::new_v4());
        assert!(token.parent.is_none());
        assert!(!token.revoked);
        assert_eq!(token.token.len(), 64);
    }

    #[test]
    fn test_child_links_to_prior_wire_string() {
        let root = RefreshToken::root(Uuid::new_v4(), Uuid::new_v4());
        let child = RefreshToken::child_of(&root);

        assert_eq!(child.parent.as_deref(), Some(root.token.as_str()));
        assert_eq!(child.session_id, root.session_id);
        assert_eq!(child.user_id, root.user_id);
        assert_ne!(child.token, root.token);
        assert!(!child.revoked);
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_token_string();
        let b = generate_token_string();
        assert_ne!(a, b);
    }
}
