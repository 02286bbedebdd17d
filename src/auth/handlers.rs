use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, SignupRequest},
        extractors::AuthUser,
        services::AuthService,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
    users::{repo_types::PublicUser, services::UserDirectory},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[instrument(skip(auth, payload))]
pub async fn signup(
    State(auth): State<AuthService>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let session = auth
        .signup(&payload.full_name, &payload.email, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user: session.user,
        }),
    ))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = auth.login(&payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        token: session.token,
        user: session.user,
    }))
}

#[instrument(skip(users))]
pub async fn me(
    State(users): State<UserDirectory>,
    caller: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(users.profile(caller.user_id).await?))
}
