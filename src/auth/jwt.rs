use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use super::cookies::ACCESS_COOKIE;
use crate::{config::JwtConfig, error::AppError};

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signing and verification keys for both token kinds, each with its own secret.
#[derive(Clone)]
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
    access_ttl: TimeDuration,
    refresh_ttl: TimeDuration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Result<Self, AppError> {
        if cfg.access_secret.trim().is_empty() || cfg.refresh_secret.trim().is_empty() {
            return Err(AppError::Signing("token secrets must not be empty".into()));
        }
        if cfg.access_secret == cfg.refresh_secret {
            return Err(AppError::Signing(
                "access and refresh secrets must differ".into(),
            ));
        }
        Ok(Self {
            access: KeyPair::from_secret(&cfg.access_secret),
            refresh: KeyPair::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: TimeDuration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: TimeDuration::minutes(cfg.refresh_ttl_minutes),
        })
    }

    pub fn access_ttl(&self) -> TimeDuration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> TimeDuration {
        self.refresh_ttl
    }

    fn keys(&self, kind: TokenKind) -> (&KeyPair, TimeDuration) {
        match kind {
            TokenKind::Access => (&self.access, self.access_ttl),
            TokenKind::Refresh => (&self.refresh, self.refresh_ttl),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AppError> {
        let (keys, ttl) = self.keys(kind);
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding)
            .map_err(|e| AppError::Signing(e.to_string()))?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue_access(&self, user_id: Uuid) -> Result<String, AppError> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, AppError> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id)?,
            refresh_token: self.issue_refresh(user_id)?,
        })
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AppError> {
        let (keys, _) = self.keys(kind);
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // Expired, malformed and wrong-key tokens all collapse into one error.
        let data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| {
            debug!(error = %e, kind = ?kind, "jwt rejected");
            AppError::Authentication("invalid token")
        })?;
        if data.claims.kind != kind {
            return Err(AppError::Authentication("invalid token"));
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Uuid, AppError> {
        self.verify_kind(token, TokenKind::Access).map(|c| c.sub)
    }

    /// Signature and expiry only; the caller must still compare against the stored token.
    pub fn verify_refresh(&self, token: &str) -> Result<Uuid, AppError> {
        self.verify_kind(token, TokenKind::Refresh).map(|c| c.sub)
    }
}

/// Authenticated user id, taken from the `accessToken` cookie or a Bearer header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<JwtKeys>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<JwtKeys>::from_ref(state);

        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(|t| t.trim().to_string());

        if cookie.is_none() && bearer.is_none() {
            return Err(AppError::Authentication("missing access token"));
        }

        // A stale cookie must not shadow a valid header.
        for token in cookie.iter().chain(bearer.iter()) {
            if let Ok(user_id) = keys.verify_access(token) {
                return Ok(AuthUser(user_id));
            }
        }
        warn!("invalid or expired access token");
        Err(AppError::Authentication("invalid token"))
    }
}
