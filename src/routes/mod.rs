pub mod auth;
pub mod comments;
pub mod posts;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The complete HTTP surface.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.limits.max_upload_bytes;

    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(comments::router())
        .route("/uploads/{*path}", get(uploads::serve))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
