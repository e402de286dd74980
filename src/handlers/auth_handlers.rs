//! Registration, sign-in and password changes.

use crate::{
    errors::AppError,
    models::{
        actor::Actor,
        user::{ChangePasswordRequest, LoginRequest, RegisterRequest, User},
    },
    services::token_service::IssuedToken,
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(user: User, issued: IssuedToken) -> Self {
        Self {
            user,
            token: issued.token,
            expires_in: issued.expires_in,
        }
    }
}

/// `POST /api/v1/auth/register`
///
/// Open to anyone; creating a root account requires a root caller.
pub async fn register(
    State(state): State<AppState>,
    caller: Option<Actor>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, issued) = state.auth.register(caller.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(user, issued))))
}

/// `POST /api/v1/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, issued) = state.auth.login(req).await?;
    Ok(Json(AuthResponse::new(user, issued)))
}

/// `PUT /api/v1/auth/password`
pub async fn change_password(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    state.auth.change_password(&actor, req).await?;
    Ok(StatusCode::NO_CONTENT)
}
