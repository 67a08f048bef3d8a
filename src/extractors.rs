use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::session::{get_cookie_value, SessionKeys};
use crate::error::AppError;
use crate::state::AppState;

/// Identity resolved from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no session token")]
    Missing,

    #[error("invalid or expired session token")]
    Invalid,
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Missing => AppError::Unauthorized,
            AuthError::Invalid => AppError::Forbidden("Forbidden".into()),
        }
    }
}

/// Validate the session cookie carried by a request.
pub fn authenticate(
    headers: &HeaderMap,
    keys: &SessionKeys,
    cookie_name: &str,
) -> Result<CurrentUser, AuthError> {
    let token = get_cookie_value(headers, cookie_name).ok_or(AuthError::Missing)?;
    let claims = keys.verify(token).map_err(|e| {
        tracing::debug!("Session token rejected: {}", e);
        AuthError::Invalid
    })?;

    Ok(CurrentUser {
        id: claims.user_id,
        username: claims.username,
    })
}

/// Extractor that requires authentication: 401 without a token, 403 with a
/// bad one.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = state.session_keys()?;
        let user = authenticate(&parts.headers, keys, &state.config.auth.cookie_name)?;
        tracing::info!(user_id = user.id, "Authenticated request");
        Ok(user)
    }
}
