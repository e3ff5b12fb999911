use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use super::cookies::{clear_session_cookies, set_session_cookies, REFRESH_COOKIE};
use super::dto::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterForm};
use super::jwt::AuthUser;
use crate::{
    error::AppError, images::MultipartForm, response::ApiResponse, state::AppState,
};

pub const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(mp).await?;
    let input = RegisterForm {
        username: form.text("username"),
        email: form.text("email"),
        full_name: form.text("fullName"),
        password: form.text("password"),
        avatar: form.file("avatar"),
        cover: form.file("coverImage"),
    };

    let user = state.auth.register(input).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let out = state
        .auth
        .login(
            payload.username.as_deref(),
            payload.email.as_deref(),
            &payload.password,
        )
        .await?;

    let keys = state.auth.keys();
    let jar = set_session_cookies(
        jar,
        &out.tokens,
        keys.access_ttl(),
        keys.refresh_ttl(),
        state.config.cookie_secure,
    );
    Ok((
        jar,
        ApiResponse::ok(LoginResponse::new(out.user, out.tokens), "User logged in successfully"),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| payload.and_then(|Json(p)| p.refresh_token));

    let tokens = state.auth.refresh(incoming.as_deref()).await?;

    let keys = state.auth.keys();
    let jar = set_session_cookies(
        jar,
        &tokens,
        keys.access_ttl(),
        keys.refresh_ttl(),
        state.config.cookie_secure,
    );
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed")))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(user_id).await?;
    let jar = clear_session_cookies(jar, state.config.cookie_secure);
    Ok((jar, ApiResponse::ok(serde_json::json!({}), "User logged out")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .change_password(user_id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}
