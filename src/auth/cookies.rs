use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use super::jwt::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn session_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}

pub fn set_session_cookies(
    jar: CookieJar,
    pair: &TokenPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    secure: bool,
) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone(), access_ttl, secure))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone(), refresh_ttl, secure))
}

/// Removal cookies carry the same attributes they were created with.
pub fn clear_session_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    let removal = |name: &'static str| {
        Cookie::build((name, ""))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Strict)
            .build()
    };
    jar.remove(removal(ACCESS_COOKIE))
        .remove(removal(REFRESH_COOKIE))
}
