use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    hash_password, hash_token, sign_jwt_for_user, verify_password, AuthUser, DUMMY_ARGON2_HASH,
};
use crate::constants::MAX_SESSIONS_PER_USER;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::sessions::Session;
use crate::store::operations::users::User;
use crate::store::StoreError;
use crate::validation::{is_valid_email, validate_display_name, validate_password};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl From<&User> for UserProfile {
    fn from(value: &User) -> Self {
        Self {
            id: value.id.clone(),
            email: value.email.clone(),
            display_name: value.display_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}

/// Signs an access token and records its session.
fn issue_token(user_id: &str, state: &AppState) -> Result<String, AppError> {
    if let Err(e) = state
        .store()
        .cleanup_oldest_user_sessions(user_id, MAX_SESSIONS_PER_USER)
    {
        tracing::warn!(user_id, error = %e, "Failed to evict surplus sessions");
    }

    let expires_in_hours = state.config().auth.token_ttl_hours;
    let access_token =
        sign_jwt_for_user(user_id, &state.config().auth.jwt_secret, expires_in_hours)?;

    let now = Utc::now();
    state.store().create_session(&Session {
        token_hash: hash_token(&access_token),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + Duration::hours(expires_in_hours as i64),
    })?;

    Ok(access_token)
}

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<Response, AppError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::bad_request(
            "AUTH_INVALID_EMAIL",
            "Invalid email format",
        ));
    }
    let display_name = req.display_name.trim();
    if let Err(msg) = validate_display_name(display_name) {
        return Err(AppError::bad_request("AUTH_INVALID_DISPLAY_NAME", msg));
    }
    if let Err(msg) = validate_password(&req.password) {
        return Err(AppError::bad_request("AUTH_WEAK_PASSWORD", msg));
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        display_name: display_name.to_string(),
        password_hash: hash_password(&req.password)?,
        created_at: Utc::now(),
    };

    match state.store().create_user(&user) {
        Ok(()) => {}
        Err(StoreError::Conflict { .. }) => {
            return Err(AppError::conflict(
                "AUTH_EMAIL_EXISTS",
                "Email already registered",
            ))
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(user_id = %user.id, "User registered");

    let access_token = issue_token(&user.id, &state)?;
    let mut response = created(AuthResponse {
        access_token: access_token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &access_token)?;
    Ok(response)
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let email = req.email.trim().to_lowercase();
    let Some(user) = state.store().get_user_by_email(&email)? else {
        let _ = verify_password(&req.password, DUMMY_ARGON2_HASH);
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login rejected");
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let access_token = issue_token(&user.id, &state)?;
    let mut response = ok(AuthResponse {
        access_token: access_token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &access_token)?;
    Ok(response)
}

/// Ends the session the request was authenticated with.
async fn logout(auth_user: AuthUser, State(state): State<AppState>) -> Result<Response, AppError> {
    state.store().delete_session(&auth_user.token_hash)?;

    let mut response = ok(serde_json::json!({ "loggedOut": true })).into_response();
    append_set_cookie(
        &mut response,
        "token=; Path=/; Max-Age=0; SameSite=Strict; HttpOnly; Secure",
    )?;
    Ok(response)
}

fn set_token_cookie(response: &mut Response, token: &str) -> Result<(), AppError> {
    append_set_cookie(
        response,
        &format!("token={token}; Path=/; SameSite=Strict; HttpOnly; Secure"),
    )
}

fn append_set_cookie(response: &mut Response, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::internal(&format!("set-cookie header invalid: {e}")))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(())
}
