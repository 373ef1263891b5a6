use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub site_url: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub cookie: CookieConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub aud: String,
    pub exp_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Whether abuse detection revokes the whole token family.
    pub refresh_token_rotation_enabled: bool,
    /// Grace window (seconds) in which a just-revoked token is still
    /// honoured, to tolerate clients that lost the previous response.
    pub refresh_token_reuse_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Header whose value keys the token endpoint's buckets; the remote
    /// address is used when unset.
    pub header: Option<String>,
    /// Requests per minute (and burst) for the token endpoint.
    pub token_refresh: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub key: String,
    /// Max-Age for token cookies; zero disables them.
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Wall-clock budget for retrying a lock-contended refresh.
    pub retry_loop_seconds: f64,
    pub retry_backoff_min_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl TokenConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = TokenConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("token-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            site_url: get_env("SITE_URL", Some("http://localhost:3000"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-only-insecure-jwt-secret"), is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("token-service"), is_prod)?,
                aud: get_env("JWT_AUD", Some("authenticated"), is_prod)?,
                exp_seconds: parse_env("JWT_EXP_SECONDS", "3600", is_prod)?,
            },
            security: SecurityConfig {
                refresh_token_rotation_enabled: parse_env(
                    "SECURITY_REFRESH_TOKEN_ROTATION_ENABLED",
                    "true",
                    is_prod,
                )?,
                refresh_token_reuse_interval: parse_env(
                    "SECURITY_REFRESH_TOKEN_REUSE_INTERVAL",
                    "10",
                    is_prod,
                )?,
            },
            rate_limit: RateLimitConfig {
                header: env::var("RATE_LIMIT_HEADER").ok().filter(|v| !v.is_empty()),
                token_refresh: parse_env("RATE_LIMIT_TOKEN_REFRESH", "30", is_prod)?,
            },
            cookie: CookieConfig {
                key: get_env("COOKIE_KEY", Some("sb"), is_prod)?,
                duration_seconds: parse_env("COOKIE_DURATION_SECONDS", "86400", is_prod)?,
            },
            api: ApiConfig {
                retry_loop_seconds: parse_env("API_RETRY_LOOP_SECONDS", "5.0", is_prod)?,
                retry_backoff_min_ms: parse_env("API_RETRY_BACKOFF_MIN_MS", "10", is_prod)?,
                retry_backoff_max_ms: parse_env("API_RETRY_BACKOFF_MAX_MS", "30", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }

        if self.jwt.exp_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXP_SECONDS must be positive"
            )));
        }

        if self.api.retry_loop_seconds <= 0.0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "API_RETRY_LOOP_SECONDS must be positive"
            )));
        }

        if self.api.retry_backoff_min_ms > self.api.retry_backoff_max_ms {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "API_RETRY_BACKOFF_MIN_MS must not exceed API_RETRY_BACKOFF_MAX_MS"
            )));
        }

        if self.environment == Environment::Prod
            && self.jwt.secret == "dev-only-insecure-jwt-secret"
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be set to a real secret in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("invalid value for {}: {}", key, e))
        })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TokenConfig {
        TokenConfig {
            common: core_config::Config {
                port: 8080,
                shutdown_grace_seconds: 30,
            },
            environment: Environment::Dev,
            service_name: "token-service".to_string(),
            service_version: "0.1.0".to_string(),
            log_level: "info".to_string(),
            site_url: "http://localhost:3000".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/token_test".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: "token-service".to_string(),
                aud: "authenticated".to_string(),
                exp_seconds: 3600,
            },
            security: SecurityConfig {
                refresh_token_rotation_enabled: true,
                refresh_token_reuse_interval: 10,
            },
            rate_limit: RateLimitConfig {
                header: None,
                token_refresh: 30,
            },
            cookie: CookieConfig {
                key: "sb".to_string(),
                duration_seconds: 86400,
            },
            api: ApiConfig {
                retry_loop_seconds: 5.0,
                retry_backoff_min_ms: 10,
                retry_backoff_max_ms: 30,
            },
        }
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_jwt_secret_fails_validation() {
        let mut config = base_config();
        config.jwt.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_backoff_range_fails_validation() {
        let mut config = base_config();
        config.api.retry_backoff_min_ms = 50;
        config.api.retry_backoff_max_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dev_secret_rejected_in_prod() {
        let mut config = base_config();
        config.environment = Environment::Prod;
        config.jwt.secret = "dev-only-insecure-jwt-secret".to_string();
        assert!(config.validate().is_err());
    }
}
