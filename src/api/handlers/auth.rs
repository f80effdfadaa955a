use chrono::{DateTime, Utc};
use lambda_http::{Body, Request, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{json_response, parse_json_body, request_id};
use crate::error::{ApiError, AuthError, ConflictError};
use crate::auth::current_token_hash;
use crate::repo::{self, StoreError};
use crate::state::AppState;
use energy_monitor::shared::domain::User;
use energy_monitor::shared::id_generator::IdPrefix;
use energy_monitor::shared::session::{
    generate_session_token, hash_password, hash_session_token, new_session, verify_password,
    SessionContext,
};
use energy_monitor::shared::validators::{validate_email, validate_name, validate_password};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User as returned by the API; the password hash never leaves the store
#[derive(Debug, Serialize)]
pub struct UserView {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Issue a new session for `user`; only the token hash is stored
async fn start_session(state: &AppState, user: &User) -> Result<SessionView, ApiError> {
    let token = generate_session_token();
    let token_hash = hash_session_token(&token, &state.config.session_pepper);
    let session = new_session(
        user,
        token_hash,
        state.clock.now(),
        state.config.session_ttl_hours,
    );

    repo::sessions::put_session(state.client(), &state.tables().sessions, &session).await?;

    Ok(SessionView {
        token,
        expires_at: session.expires_at,
        user: UserView::from(user),
    })
}

/// Handler for POST /auth/register
pub async fn register(event: &Request, state: &AppState) -> Result<Response<Body>, ApiError> {
    let request_id = request_id(event);
    let payload: RegisterRequest = parse_json_body(event)?;

    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;

    let display_name = match payload.display_name {
        Some(name) => {
            validate_name("display_name", &name)?;
            name.trim().to_string()
        }
        None => email.split('@').next().unwrap_or_default().to_string(),
    };

    if repo::users::find_user_by_email(state.client(), &state.tables().users, &email)
        .await?
        .is_some()
    {
        info!(request_id = %request_id, "Registration rejected, email in use");
        return Err(ConflictError::EmailTaken.into());
    }

    let user = User {
        user_id: state.ids.prefixed(IdPrefix::User),
        email,
        display_name,
        password_hash: hash_password(&payload.password)?,
        created_at: state.clock.now(),
    };

    repo::users::create_user(state.client(), &state.tables().users, &user)
        .await
        .map_err(|e| match e {
            StoreError::ConditionalCheckFailed => ApiError::Conflict(ConflictError::EmailTaken),
            other => other.into(),
        })?;

    info!(request_id = %request_id, user_id = %user.user_id, "Registered user");

    let session = start_session(state, &user).await?;
    json_response(201, &session)
}

/// Handler for POST /auth/login
pub async fn login(event: &Request, state: &AppState) -> Result<Response<Body>, ApiError> {
    let request_id = request_id(event);
    let payload: LoginRequest = parse_json_body(event)?;
    let email = normalize_email(&payload.email);

    let user = repo::users::find_user_by_email(state.client(), &state.tables().users, &email)
        .await?
        .filter(|user| verify_password(&payload.password, &user.password_hash))
        .ok_or_else(|| {
            warn!(request_id = %request_id, "Login failed");
            AuthError::InvalidCredentials
        })?;

    let session = start_session(state, &user).await?;
    info!(request_id = %request_id, user_id = %user.user_id, "User logged in");

    json_response(200, &session)
}

/// Handler for POST /auth/logout. Deletes the caller's session.
pub async fn logout(
    event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let token_hash = current_token_hash(event, state)?;
    repo::sessions::delete_session(state.client(), &state.tables().sessions, &token_hash).await?;

    info!(
        request_id = %request_id(event),
        user_id = %session.user_id,
        "User logged out"
    );

    json_response(200, &serde_json::json!({ "logged_out": true }))
}

/// Handler for GET /auth/me
pub async fn me(
    _event: &Request,
    state: &AppState,
    session: &SessionContext,
) -> Result<Response<Body>, ApiError> {
    let user = repo::users::get_user(state.client(), &state.tables().users, &session.user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    json_response(200, &UserView::from(&user))
}
