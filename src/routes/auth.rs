use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/signin", post(handlers::signin))
        .route("/api/auth/signout", post(handlers::signout))
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/google", get(handlers::google_redirect))
        .route("/api/callback/google", get(handlers::google_callback))
}
