use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use crate::models::{AuditEvent, RefreshToken, Session, User};
use crate::services::store::{StoreError, TokenContext, TokenStore, TokenStoreTx};

const TOKEN_COLUMNS: &str =
    "id, token, user_id, session_id, revoked, parent, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, not_after, created_at";
const USER_COLUMNS: &str =
    "id, email, aud, confirmed_at, banned_until, created_at, updated_at";

/// PostgreSQL-backed token store. Row locks are taken with `FOR UPDATE
/// NOWAIT`; a contended lock raises 55P03 which is folded into the
/// retryable `NotFound` sentinel instead of parking the connection.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_lock_not_available(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("55P03"),
        _ => false,
    }
}

fn map_lock_err(err: sqlx::Error) -> StoreError {
    if is_lock_not_available(&err) {
        StoreError::NotFound
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user_with_refresh_token(
        &self,
        token: &str,
    ) -> Result<TokenContext, StoreError> {
        let token_row = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(token_row.session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(token_row.user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(TokenContext {
            user,
            token: token_row,
            session,
        })
    }

    async fn begin(&self) -> Result<Box<dyn TokenStoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTokenStoreTx { tx }))
    }

    async fn grant_authenticated_user(&self, user: &User) -> Result<RefreshToken, StoreError> {
        let mut tx = self.pool.begin().await?;

        let session = Session::new(user.id);
        sqlx::query(
            "INSERT INTO sessions (id, user_id, not_after, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.not_after)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await?;

        let token = RefreshToken::root(user.id, session.id);
        insert_refresh_token(&mut tx, &token).await?;

        tx.commit().await?;
        Ok(token)
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, aud, confirmed_at, banned_until, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.aud)
        .bind(user.confirmed_at)
        .bind(user.banned_until)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_refresh_tokens(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let tokens = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE session_id = $1 ORDER BY created_at"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

async fn insert_refresh_token(
    tx: &mut Transaction<'static, Postgres>,
    token: &RefreshToken,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO refresh_tokens \
         (id, token, user_id, session_id, revoked, parent, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(token.id)
    .bind(&token.token)
    .bind(token.user_id)
    .bind(token.session_id)
    .bind(token.revoked)
    .bind(&token.parent)
    .bind(token.created_at)
    .bind(token.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub struct PgTokenStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TokenStoreTx for PgTokenStoreTx {
    async fn find_user_with_refresh_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<TokenContext, StoreError> {
        let token_row = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token = $1 FOR UPDATE NOWAIT"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_lock_err)?
        .ok_or(StoreError::NotFound)?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 FOR UPDATE NOWAIT"
        ))
        .bind(token_row.session_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_lock_err)?
        .ok_or(StoreError::NotFound)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(token_row.user_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(TokenContext {
            user,
            token: token_row,
            session,
        })
    }

    async fn find_currently_active_refresh_token(
        &mut self,
        session_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens \
             WHERE session_id = $1 AND revoked = false \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(token)
    }

    async fn grant_refresh_token_swap(
        &mut self,
        _user: &User,
        prior: &RefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = true, updated_at = now() WHERE id = $1")
            .bind(prior.id)
            .execute(&mut *self.tx)
            .await?;

        let child = RefreshToken::child_of(prior);
        insert_refresh_token(&mut self.tx, &child).await?;
        Ok(child)
    }

    async fn revoke_token_family(&mut self, anchor: &RefreshToken) -> Result<(), StoreError> {
        // Walk parent links both ways: ancestors via token = parent,
        // descendants via parent = token. Bounded by the session's swap
        // count; UNION deduplicates so the recursion terminates.
        sqlx::query(
            "WITH RECURSIVE family AS ( \
                 SELECT id, token, parent FROM refresh_tokens WHERE id = $1 \
               UNION \
                 SELECT rt.id, rt.token, rt.parent \
                 FROM refresh_tokens rt \
                 JOIN family f ON rt.parent = f.token OR rt.token = f.parent \
             ) \
             UPDATE refresh_tokens SET revoked = true, updated_at = now() \
             WHERE id IN (SELECT id FROM family) AND revoked = false",
        )
        .bind(anchor.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn record_audit_event(&mut self, event: AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_log_entries \
             (id, user_id, event_type_code, ip_address, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.event_type_code)
        .bind(&event.ip_address)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
