//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event types the token subsystem emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TokenRefreshed,
    TokenRevoked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::TokenRevoked => "token_revoked",
        }
    }
}

/// Audit event entity. Written inside the same transaction as the change it
/// records; a failed write aborts the refresh so the trail stays complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type_code: String,
    pub ip_address: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        user_id: Option<Uuid>,
        ip_address: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_type_code: event_type.as_str().to_string(),
            ip_address,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Entry recorded on every successful rotation.
    pub fn token_refreshed(user_id: Uuid, ip_address: Option<String>) -> Self {
        Self::new(
            AuditEventType::TokenRefreshed,
            Some(user_id),
            ip_address,
            serde_json::json!({}),
        )
    }

    /// Entry recorded when a token family is revoked on abuse detection.
    pub fn token_revoked(
        user_id: Uuid,
        refresh_token_id: Uuid,
        ip_address: Option<String>,
    ) -> Self {
        Self::new(
            AuditEventType::TokenRevoked,
            Some(user_id),
            ip_address,
            serde_json::json!({ "refresh_token_id": refresh_token_id }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes() {
        assert_eq!(AuditEventType::TokenRefreshed.as_str(), "token_refreshed");
        assert_eq!(AuditEventType::TokenRevoked.as_str(), "token_revoked");
    }

    #[test]
    fn test_token_revoked_payload_carries_token_id() {
        let token_id = Uuid::new_v4();
        let event = AuditEvent::token_revoked(Uuid::new_v4(), token_id, None);
        assert_eq!(event.event_type_code, "token_revoked");
        assert_eq!(
            event.payload["refresh_token_id"],
            serde_json::json!(token_id)
        );
    }
}
