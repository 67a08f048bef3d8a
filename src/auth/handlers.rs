use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::accounts;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{clear_session_cookie, session_cookie, SameSite};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

/// Cookie lifetime in seconds; must also fit the token's signed `i64` expiry.
fn session_max_age(hours: u64) -> AppResult<u64> {
    hours
        .checked_mul(3600)
        .filter(|secs| i64::try_from(*secs).is_ok())
        .ok_or_else(|| {
            AppError::Internal(format!("session length of {} hours is too large", hours))
        })
}

/// Issue a session token for `user` and wrap it in a response with the cookie set.
fn signed_in_response(
    state: &AppState,
    user_id: i64,
    username: &str,
    hours: u64,
    same_site: SameSite,
    message: &str,
) -> AppResult<Response> {
    let max_age = session_max_age(hours)?;
    let token = state
        .session_keys()?
        .issue(user_id, username, max_age as i64)
        .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))?;

    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        max_age,
        same_site,
        state.config.server.production,
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": message })),
    )
        .into_response())
}

// -- Password accounts --

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignUpRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let username = required(req.username, "username")?;
    let email = required(req.email, "email")?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("password is required".into()))?;
    if !email.contains('@') {
        return Err(AppError::BadRequest("email is invalid".into()));
    }

    // Checked again on insert.
    state.session_keys()?;
    {
        let conn = state.db.get()?;
        if accounts::find_by_username(&conn, &username)?.is_some() {
            return Err(AppError::Conflict("User already exists".into()));
        }
    }

    let cost = state.config.auth.bcrypt_cost;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;

    let user = {
        let conn = state.db.get()?;
        accounts::create_user(&conn, &username, Some(&email), Some(&password_hash))?
    };
    tracing::info!(user_id = user.id, "User signed up");

    signed_in_response(
        &state,
        user.id,
        &user.username,
        state.config.auth.session_hours,
        SameSite::Lax,
        "Sign-Up successful",
    )
}

/// POST /api/auth/signin
pub async fn signin(
    State(state): State<AppState>,
    body: Result<Json<SignInRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let username = required(req.username, "username")?;
    let password = req
        .password
        .ok_or_else(|| AppError::BadRequest("password is required".into()))?;

    let user = {
        let conn = state.db.get()?;
        accounts::find_by_username(&conn, &username)?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?
    };

    // OAuth-only accounts have no password to match.
    let stored = user.password_hash.clone().ok_or(AppError::Unauthorized)?;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))?
        .unwrap_or(false);
    if !valid {
        tracing::warn!(user_id = user.id, "Invalid password");
        return Err(AppError::Unauthorized);
    }

    signed_in_response(
        &state,
        user.id,
        &user.username,
        state.config.auth.session_hours,
        SameSite::Lax,
        "Sign-in successful",
    )
}

/// POST /api/auth/signout. Clearing an absent cookie is fine.
pub async fn signout(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(json!({ "message": "Sign-out successful" })),
    )
        .into_response()
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let found = accounts::find_by_id(&conn, user.id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(json!({ "username": found.username })).into_response())
}

// -- Google OAuth --

/// GET /api/auth/google
pub async fn google_redirect(State(state): State<AppState>) -> AppResult<Response> {
    let url = state
        .oauth()?
        .authorize_url()
        .map_err(|e| AppError::Internal(format!("Failed to build authorization URL: {}", e)))?;
    Ok(Redirect::to(&url).into_response())
}

/// GET /api/callback/google?code=
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing code parameter from Google OAuth".into()))?;

    let provider = state.oauth()?;
    let profile = provider.exchange_code(&code).await.map_err(|e| {
        tracing::error!("Error handling Google OAuth callback: {}", e);
        AppError::Internal("Internal server error".into())
    })?;

    let user = {
        let mut conn = state.db.get()?;
        accounts::find_or_create_linked(&mut conn, provider.name(), &profile)?
    };

    let mut response = signed_in_response(
        &state,
        user.id,
        &user.username,
        state.config.auth.oauth_session_hours,
        SameSite::Strict,
        "Sign-in successful",
    )?;
    *response.status_mut() = StatusCode::FOUND;
    response
        .headers_mut()
        .insert(header::LOCATION, header::HeaderValue::from_static("/"));
    Ok(response)
}
