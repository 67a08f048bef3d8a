use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::enrich::describe_or_fallback;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::posts::form::{self, NewPost};
use crate::posts::repository::{self, PostDraft};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

/// Body of `GET /api/posts/{postId}`: detected image labels as the description.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    pub id: i64,
    pub heading: String,
    pub image_url: String,
    pub description: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/{post_id}", get(post_detail))
        .route("/api/verifyUser", get(list_own_posts).delete(delete_post))
}

fn parse_id(raw: &str, what: &str) -> AppResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid or missing {}", what)))
}

async fn list_posts(State(state): State<AppState>, _user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let posts = repository::list_posts(&conn, None)?;
    Ok(Json(posts).into_response())
}

async fn list_own_posts(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let posts = repository::list_posts(&conn, Some(user.id))?;
    Ok(Json(posts).into_response())
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let NewPost {
        heading,
        reviews,
        location,
        image,
    } = form::decode(multipart).await?;

    let imagelink = state.image_host.upload(image.path()).await?;
    // The spooled file is no longer needed once hosted.
    drop(image);

    let description = describe_or_fallback(state.describer.as_ref(), &heading).await;

    let post = {
        let mut conn = state.db.get()?;
        repository::create_post(
            &mut conn,
            user.id,
            &PostDraft {
                heading: &heading,
                reviews: &reviews,
                imagelink: &imagelink,
                description: &description,
                location: location.as_ref(),
            },
        )?
    };
    tracing::info!(post_id = post.id, user_id = user.id, "Post created");

    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Response> {
    let post_id = parse_id(&post_id, "post ID")?;
    let post = {
        let conn = state.db.get()?;
        repository::find_post(&conn, post_id)?
            .ok_or_else(|| AppError::NotFound("Post not found".into()))?
    };

    let labels = state.labeler.labels(&post.imagelink).await?;
    if labels.is_empty() {
        return Err(AppError::NotFound("No labels found for this image".into()));
    }

    Ok(Json(PostDetail {
        id: post.id,
        heading: post.heading,
        image_url: post.imagelink,
        description: labels.join(", "),
    })
    .into_response())
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Response> {
    let raw = query
        .id
        .ok_or_else(|| AppError::BadRequest("Invalid or missing post ID".into()))?;
    let post_id = parse_id(&raw, "post ID")?;

    {
        let mut conn = state.db.get()?;
        repository::delete_post_owned(&mut conn, post_id, user.id)?;
    }

    Ok(Json(json!({ "message": "Post and related comments deleted successfully" })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id(" 12 ", "post ID").unwrap(), 12);
        assert!(matches!(parse_id("abc", "post ID"), Err(AppError::BadRequest(_))));
        assert!(parse_id("", "post ID").is_err());
    }

    #[test]
    fn detail_serialises_image_url_in_camel_case() {
        let detail = PostDetail {
            id: 1,
            heading: "Ramen".into(),
            image_url: "https://img".into(),
            description: "Food, Noodle".into(),
        };
        let value = serde_json::to_value(detail).unwrap();
        assert_eq!(value["imageUrl"], "https://img");
        assert_eq!(value["description"], "Food, Noodle");
    }
}
