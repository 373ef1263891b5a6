use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuditEvent, RefreshToken, Session, User};

/// Everything a refresh request needs to know about the presented token.
#[derive(Debug, Clone)]
pub struct TokenContext {
    pub user: User,
    pub token: RefreshToken,
    pub session: Session,
}

/// `NotFound` covers both genuine absence and a contended row lock: the
/// orchestrator cannot tell them apart mid-transaction and retries, which
/// is the point (lock waits become API-level sleeps instead of held
/// connections).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for tokens, sessions and the parent/child chain.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Advisory pre-check lookup; takes no locks. Enforcement happens on
    /// the re-read inside a transaction.
    async fn find_user_with_refresh_token(&self, token: &str)
        -> Result<TokenContext, StoreError>;

    /// Open a transaction for the locked portion of a refresh.
    async fn begin(&self) -> Result<Box<dyn TokenStoreTx>, StoreError>;

    /// Create a fresh session and its root refresh token. Entry point for
    /// the external grant flows (password, code exchange).
    async fn grant_authenticated_user(&self, user: &User) -> Result<RefreshToken, StoreError>;

    /// Shim for the external user store.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    /// All tokens of a session, oldest first.
    async fn session_refresh_tokens(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError>;
}

/// One open transaction. Dropping it without committing rolls back and
/// releases any row locks it acquired.
#[async_trait]
pub trait TokenStoreTx: Send {
    /// Re-read the presented token with row locks on the token and session
    /// rows. Lock acquisition is non-blocking; contention surfaces as
    /// [`StoreError::NotFound`] so the caller can retry at the API layer.
    async fn find_user_with_refresh_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<TokenContext, StoreError>;

    /// The single non-revoked token of the session, if any.
    async fn find_currently_active_refresh_token(
        &mut self,
        session_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError>;

    /// Atomically revoke `prior` and insert a child whose `parent` is
    /// `prior.token`, in the same session.
    async fn grant_refresh_token_swap(
        &mut self,
        user: &User,
        prior: &RefreshToken,
    ) -> Result<RefreshToken, StoreError>;

    /// Revoke every token reachable from the anchor by walking `parent`
    /// links in either direction. Re-revoking is a no-op.
    async fn revoke_token_family(&mut self, anchor: &RefreshToken) -> Result<(), StoreError>;

    /// Audit write bound to this transaction; failure aborts the refresh.
    async fn record_audit_event(&mut self, event: AuditEvent) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
