use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Server-side anchor binding a chain of refresh tokens to one
/// authentication event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub not_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            not_after: None,
            created_at: Utc::now(),
        }
    }

    /// Once `not_after` has passed, no refresh may succeed against tokens
    /// in this session.
    pub fn is_expired(&self) -> bool {
        match self.not_after {
            Some(not_after) => Utc::now() > not_after,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_without_deadline_never_expires() {
        let session = Session::new(Uuid::new_v4());
        assert!(!session.is_expired());
    }

    #[test]
    fn test_session_past_not_after_is_expired() {
        let mut session = Session::new(Uuid::new_v4());
        session.not_after = Some(Utc::now() - Duration::seconds(1));
        assert!(session.is_expired());
    }

    #[test]
    fn test_session_before_not_after_is_live() {
        let mut session = Session::new(Uuid::new_v4());
        session.not_after = Some(Utc::now() + Duration::seconds(1));
        assert!(!session.is_expired());
    }
}
