use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::Component;

use crate::state::AppState;

/// Serve an image stored by the local image host.
pub async fn serve(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let relative = std::path::Path::new(&path);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::read(state.config.uploads_path().join(relative)).await {
        Ok(data) => {
            let mime = mime_guess::from_path(relative).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
