use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, error, instrument, warn};

use super::dto::{
    ListQuery, LoginRequest, RegisterRequest, TokenResponse, UpdateUserRequest, UserListResponse,
};
use super::repo_types::User;
use crate::{auth::AuthUser, error::AccountError, state::AppState};

type ApiError = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let draft = payload.into_draft().map_err(bad_request)?;
    let cancel = state.shutdown.child_token();
    let token = state
        .accounts
        .register(draft, &cancel)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let credentials = payload.into_credentials().map_err(bad_request)?;
    let cancel = state.shutdown.child_token();
    let token = state
        .accounts
        .login(credentials, &cancel)
        .await
        .map_err(reject)?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, caller))]
pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    debug!(caller = caller.user_id, role = %caller.role, "list users");
    let cancel = state.shutdown.child_token();
    let page = state
        .accounts
        .list(q.page, q.page_size, &cancel)
        .await
        .map_err(reject)?;
    Ok(Json(page.into()))
}

#[instrument(skip(state, caller))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    debug!(caller = caller.user_id, "get user");
    let cancel = state.shutdown.child_token();
    let user = state
        .accounts
        .get_by_id(id, &cancel)
        .await
        .map_err(reject)?;
    Ok(Json(user))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    debug!(caller = caller.user_id, "update user");
    let patch = payload.into_patch().map_err(bad_request)?;
    let cancel = state.shutdown.child_token();
    let user = state
        .accounts
        .update(id, patch, &cancel)
        .await
        .map_err(reject)?;
    Ok(Json(user))
}

#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    debug!(caller = caller.user_id, "delete user");
    let cancel = state.shutdown.child_token();
    state
        .accounts
        .delete(id, &cancel)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

fn bad_request(msg: &'static str) -> ApiError {
    warn!(reason = msg, "invalid request");
    (StatusCode::BAD_REQUEST, msg.to_string())
}

fn reject(e: AccountError) -> ApiError {
    match e {
        AccountError::NotFound => (StatusCode::NOT_FOUND, "User not found".into()),
        AccountError::Conflict => (StatusCode::CONFLICT, e.to_string()),
        AccountError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
        AccountError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Request cancelled".into(),
        ),
        AccountError::Internal(detail) => {
            error!(error = %detail, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".into(),
            )
        }
    }
}
