use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::CookieConfig;
use crate::dtos::AccessTokenResponse;

fn access_cookie_name(config: &CookieConfig) -> String {
    format!("{}-access-token", config.key)
}

fn refresh_cookie_name(config: &CookieConfig) -> String {
    format!("{}-refresh-token", config.key)
}

fn token_cookie(name: String, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Attach access- and refresh-token cookies to a successful response.
/// Disabled when the configured duration is zero.
pub fn set_cookie_tokens(
    config: &CookieConfig,
    jar: CookieJar,
    response: &AccessTokenResponse,
) -> CookieJar {
    if config.duration_seconds <= 0 {
        return jar;
    }

    let max_age = time::Duration::seconds(config.duration_seconds);
    jar.add(token_cookie(
        access_cookie_name(config),
        response.access_token.clone(),
        max_age,
    ))
    .add(token_cookie(
        refresh_cookie_name(config),
        response.refresh_token.clone(),
        max_age,
    ))
}

/// Emit expired token cookies so the client drops whatever it holds.
pub fn clear_cookie_tokens(config: &CookieConfig, jar: CookieJar) -> CookieJar {
    jar.add(token_cookie(
        access_cookie_name(config),
        String::new(),
        time::Duration::ZERO,
    ))
    .add(token_cookie(
        refresh_cookie_name(config),
        String::new(),
        time::Duration::ZERO,
    ))
}
