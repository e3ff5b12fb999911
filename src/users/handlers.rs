use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::model::AssetSlot;
use crate::{
    auth::{handlers::UPLOAD_LIMIT_BYTES, AuthUser},
    error::AppError,
    images::MultipartForm,
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route(
            "/users/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route(
            "/users/cover-image",
            patch(update_cover).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.current_user(user_id).await?;
    Ok(ApiResponse::ok(user, "Current user fetched successfully"))
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .update_account(user_id, payload.full_name.as_deref(), payload.email.as_deref())
        .await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(mp).await?;
    let user = state
        .auth
        .update_asset(user_id, AssetSlot::Avatar, form.file("avatar"))
        .await?;
    Ok(ApiResponse::ok(user, "Avatar image updated successfully"))
}

#[instrument(skip(state, mp))]
pub async fn update_cover(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = MultipartForm::read(mp).await?;
    let user = state
        .auth
        .update_asset(user_id, AssetSlot::Cover, form.file("coverImage"))
        .await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}
