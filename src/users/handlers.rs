use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, put},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        ChangePasswordRequest, MessageResponse, Pagination, UpdateProfileRequest,
        UserMessageResponse, UserPage,
    },
    repo_types::{PublicUser, Status},
    services::{page_params, UserDirectory},
};
use crate::{
    auth::{
        extractors::{AdminUser, AuthUser},
        services::AuthService,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/change-password", put(change_password))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/activate", patch(activate_user))
        .route("/users/:id/deactivate", patch(deactivate_user))
}

#[instrument(skip(users))]
pub async fn get_profile(
    State(users): State<UserDirectory>,
    caller: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(users.profile(caller.user_id).await?))
}

#[instrument(skip(auth, payload))]
pub async fn update_profile(
    State(auth): State<AuthService>,
    caller: AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserMessageResponse>, AppError> {
    let user = auth
        .update_profile(
            caller.user_id,
            payload.full_name.as_deref(),
            payload.email.as_deref(),
        )
        .await?;
    Ok(Json(UserMessageResponse {
        message: "Profile updated",
        user,
    }))
}

#[instrument(skip(auth, payload))]
pub async fn change_password(
    State(auth): State<AuthService>,
    caller: AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth.change_password(
        caller.user_id,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(MessageResponse {
        message: "Password updated successfully",
    }))
}

#[instrument(skip(users))]
pub async fn list_users(
    State(users): State<UserDirectory>,
    AdminUser(_admin): AdminUser,
    Query(p): Query<Pagination>,
) -> Result<Json<UserPage>, AppError> {
    let (page, limit) = page_params(p.page.as_deref(), p.limit.as_deref());
    Ok(Json(users.list(page, limit).await?))
}

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse::<Uuid>().map_err(|_| {
        warn!(id = %raw, "malformed user id");
        AppError::NotFound
    })
}

#[instrument(skip(users))]
pub async fn activate_user(
    State(users): State<UserDirectory>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<UserMessageResponse>, AppError> {
    let user = users.set_status(parse_user_id(&id)?, Status::Active).await?;
    Ok(Json(UserMessageResponse {
        message: "User activated",
        user,
    }))
}

#[instrument(skip(users))]
pub async fn deactivate_user(
    State(users): State<UserDirectory>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<UserMessageResponse>, AppError> {
    let user = users.set_status(parse_user_id(&id)?, Status::Inactive).await?;
    Ok(Json(UserMessageResponse {
        message: "User deactivated",
        user,
    }))
}
