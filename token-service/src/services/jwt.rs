use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

/// JWT service minting session-bound access tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    exp_seconds: i64,
}

/// Claims carried by access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: String,
    /// Audience
    pub aud: String,
    /// Issuer
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Session the token is bound to
    pub session_id: String,
}

#[derive(Debug, Error)]
pub enum MintError {
    #[error("jwt secret is not configured")]
    MissingSecret,

    #[error("failed to encode access token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid access token: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, MintError> {
        if config.secret.is_empty() {
            return Err(MintError::MissingSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.aud.clone(),
            exp_seconds: config.exp_seconds,
        })
    }

    /// Produce a compact signed access token bound to `session_id` and the
    /// absolute epoch second it expires at. Pure given its inputs.
    pub fn mint_access_token(
        &self,
        user: &User,
        session_id: Uuid,
    ) -> Result<(String, i64), MintError> {
        let now = Utc::now();
        let expires_at = now.timestamp() + self.exp_seconds;

        let audience = if user.aud.is_empty() {
            self.audience.clone()
        } else {
            user.aud.clone()
        };

        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            aud: audience,
            iss: self.issuer.clone(),
            exp: expires_at,
            iat: now.timestamp(),
            session_id: session_id.to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key).map_err(MintError::Encode)?;

        Ok((token, expires_at))
    }

    /// Validate and decode an access token.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, MintError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(MintError::Decode)?;

        Ok(token_data.claims)
    }

    /// Access token lifetime in seconds (for the `expires_in` field).
    pub fn exp_seconds(&self) -> i64 {
        self.exp_seconds
    }
}
