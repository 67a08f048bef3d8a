use axum::extract::rejection::JsonRejection;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;

use crate::comments;
use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::notify::{channel_for_post, Notification, NEW_COMMENT};
use crate::posts::repository;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentRequest {
    pub content: Option<String>,
    pub post_id: Option<Value>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/comments", get(list_comments).post(add_comment))
        .route("/api/comments/stream", get(comment_events))
}

/// `postId` arrives either as a JSON number or as a numeric string.
fn post_id_from_json(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Exactly one numeric `postId` in the query string.
fn post_id_from_query(query: Option<&str>) -> AppResult<i64> {
    let invalid = || AppError::BadRequest("Invalid postId".into());
    let mut values = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == "postId")
        .map(|(_, value)| value.into_owned());

    let value = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        return Err(invalid());
    }
    value.trim().parse().map_err(|_| invalid())
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<AddCommentRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let post_id = post_id_from_json(req.post_id.as_ref())
        .ok_or_else(|| AppError::BadRequest("Invalid input".into()))?;
    let content = comments::validate_content(req.content.as_deref().unwrap_or_default())?;

    let comment = {
        let conn = state.db.get()?;
        comments::add_comment(&conn, post_id, user.id, &content)?
    };
    tracing::info!(comment_id = comment.id, post_id, "Comment added");

    publish_new_comment(&state, &comment);

    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

/// Fire-and-forget: the response never waits on delivery.
fn publish_new_comment(state: &AppState, comment: &Comment) {
    let notifier = state.notifier.clone();
    let channel = channel_for_post(comment.post_id);
    let data = match serde_json::to_value(comment) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to encode comment event: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        let notification = Notification {
            event: NEW_COMMENT.to_string(),
            data,
        };
        if let Err(e) = notifier.publish(&channel, notification).await {
            tracing::warn!("Failed to publish comment event: {}", e);
        }
    });
}

async fn list_comments(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    let post_id = post_id_from_query(query.as_deref())?;
    let conn = state.db.get()?;
    let comments = comments::list_comments(&conn, post_id)?;
    Ok(Json(comments).into_response())
}

/// SSE stream of new comments on one post.
async fn comment_events(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let post_id = post_id_from_query(query.as_deref())?;
    {
        let conn = state.db.get()?;
        if repository::find_post(&conn, post_id)?.is_none() {
            return Err(AppError::NotFound("Post not found".into()));
        }
    }
    tracing::debug!(post_id, "Comment stream opened");

    let stream = state
        .notifier
        .subscribe(&channel_for_post(post_id))
        .map(|n| Ok(Event::default().event(n.event).data(n.data.to_string())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
