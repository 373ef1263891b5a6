use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::config::{ApiConfig, SecurityConfig};
use crate::dtos::AccessTokenResponse;
use crate::models::{AuditEvent, RefreshToken};
use crate::services::error::ServiceError;
use crate::services::jwt::JwtService;
use crate::services::metering;
use crate::services::store::{StoreError, TokenContext, TokenStore};

/// Orchestrates the refresh_token grant: validation, transactional swap
/// and response assembly, with an API-level retry loop absorbing row-lock
/// contention.
#[derive(Clone)]
pub struct RefreshService {
    store: Arc<dyn TokenStore>,
    jwt: JwtService,
    security: SecurityConfig,
    api: ApiConfig,
}

impl RefreshService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        jwt: JwtService,
        security: SecurityConfig,
        api: ApiConfig,
    ) -> Self {
        Self {
            store,
            jwt,
            security,
            api,
        }
    }

    /// Exchange a refresh token for a fresh access token and the session's
    /// current refresh token (usually a newly swapped child).
    ///
    /// Concurrent refreshes of the same session serialize on the database
    /// row lock; instead of queueing on a pooled connection, a contended
    /// iteration rolls back and retries after a 10-30ms jittered sleep,
    /// for at most `api.retry_loop_seconds` of wall clock.
    pub async fn refresh_token_grant(
        &self,
        refresh_token: &str,
        ip_address: Option<String>,
    ) -> Result<AccessTokenResponse, ServiceError> {
        if refresh_token.is_empty() {
            return Err(ServiceError::MissingRefreshToken);
        }

        let retry_start = Instant::now();
        let retry_budget = Duration::from_secs_f64(self.api.retry_loop_seconds);

        while retry_start.elapsed() < retry_budget {
            // Fast negative path. Decisions here are advisory; everything
            // is enforced again under the row lock.
            let precheck = match self.store.find_user_with_refresh_token(refresh_token).await {
                Ok(ctx) => ctx,
                Err(StoreError::NotFound) => return Err(ServiceError::RefreshTokenNotFound),
                Err(err) => return Err(err.into()),
            };

            if precheck.user.is_banned() {
                return Err(ServiceError::UserBanned);
            }
            if precheck.session.is_expired() {
                return Err(ServiceError::SessionExpired);
            }

            let mut tx = self.store.begin().await?;

            let locked = match tx
                .find_user_with_refresh_token_for_update(refresh_token)
                .await
            {
                Ok(ctx) => ctx,
                Err(StoreError::NotFound) => {
                    // The pre-check just saw this token, so absence here
                    // means the token or session row is locked by a
                    // concurrent refresh. Back off and retry the whole
                    // process.
                    tx.rollback().await?;
                    self.backoff().await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let TokenContext {
                user,
                token,
                session: _,
            } = locked;

            let mut issued: Option<RefreshToken> = None;

            if token.revoked {
                let active = tx
                    .find_currently_active_refresh_token(token.session_id)
                    .await?;

                match active {
                    Some(active) if active.parent.as_deref() == Some(token.token.as_str()) => {
                        // The client refreshed but never stored the result.
                        // Hand back the active child instead of minting a
                        // sibling.
                        issued = Some(active);
                    }
                    _ => {
                        let reuse_until = token.updated_at
                            + chrono::Duration::seconds(
                                self.security.refresh_token_reuse_interval as i64,
                            );

                        if Utc::now() > reuse_until {
                            return self.reject_reused_token(tx, &user.id, &token, ip_address).await;
                        }
                        // Inside the reuse interval: fall through to a
                        // normal swap off the presented token, creating a
                        // sibling of the current active token.
                    }
                }
            }

            tx.record_audit_event(AuditEvent::token_refreshed(user.id, ip_address.clone()))
                .await?;

            let issued = match issued {
                Some(token) => token,
                None => tx.grant_refresh_token_swap(&user, &token).await?,
            };

            let (access_token, expires_at) = self.jwt.mint_access_token(&user, issued.session_id)?;

            tx.commit().await?;

            metering::record_login("token", user.id);

            return Ok(AccessTokenResponse {
                access_token,
                token_type: "bearer".to_string(),
                expires_in: self.jwt.exp_seconds(),
                expires_at,
                refresh_token: issued.token,
                user: user.sanitized(),
            });
        }

        Err(ServiceError::TooManyRefreshRequests)
    }

    /// Abuse branch: a revoked token presented outside its reuse interval.
    /// With rotation enabled the whole family is revoked, and that
    /// revocation is committed before the error goes out so it survives
    /// the failed request.
    async fn reject_reused_token(
        &self,
        mut tx: Box<dyn crate::services::store::TokenStoreTx>,
        user_id: &Uuid,
        token: &RefreshToken,
        ip_address: Option<String>,
    ) -> Result<AccessTokenResponse, ServiceError> {
        tracing::warn!(
            refresh_token_id = %token.id,
            user_id = %user_id,
            "possible abuse attempt: revoked refresh token presented outside its reuse interval"
        );

        if self.security.refresh_token_rotation_enabled {
            tx.revoke_token_family(token).await?;
            tx.record_audit_event(AuditEvent::token_revoked(
                *user_id,
                token.id,
                ip_address,
            ))
            .await?;
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        Err(ServiceError::RefreshTokenAlreadyUsed)
    }

    async fn backoff(&self) {
        let millis = rand::thread_rng()
            .gen_range(self.api.retry_backoff_min_ms..=self.api.retry_backoff_max_ms);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}
