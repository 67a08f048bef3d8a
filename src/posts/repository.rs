use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{Location, Post};
use crate::error::{AppError, AppResult};

/// Everything needed to persist a post once the image is hosted and the
/// description is known.
#[derive(Debug, Clone)]
pub struct PostDraft<'a> {
    pub heading: &'a str,
    pub reviews: &'a str,
    pub imagelink: &'a str,
    pub description: &'a str,
    pub location: Option<&'a Location>,
}

const POST_SELECT: &str = "SELECT p.id, p.heading, p.imagelink, p.reviews, p.description,
            p.created_at, u.username, p.user_id,
            l.id, l.address, l.latitude, l.longitude
     FROM posts p
     JOIN users u ON u.id = p.user_id
     LEFT JOIN locations l ON l.post_id = p.id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let location_id: Option<i64> = row.get(8)?;
    let location = match location_id {
        Some(_) => Some(Location {
            address: row.get(9)?,
            latitude: row.get(10)?,
            longitude: row.get(11)?,
        }),
        None => None,
    };

    Ok(Post {
        id: row.get(0)?,
        heading: row.get(1)?,
        imagelink: row.get(2)?,
        reviews: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        created_by: row.get(6)?,
        user_id: row.get(7)?,
        location,
    })
}

/// Insert a post and its location (if any) atomically.
pub fn create_post(conn: &mut Connection, user_id: i64, draft: &PostDraft<'_>) -> AppResult<Post> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO posts (user_id, heading, imagelink, reviews, description)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            draft.heading,
            draft.imagelink,
            draft.reviews,
            draft.description
        ],
    )?;
    let post_id = tx.last_insert_rowid();

    if let Some(location) = draft.location {
        tx.execute(
            "INSERT INTO locations (post_id, address, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                post_id,
                location.address,
                location.latitude,
                location.longitude
            ],
        )?;
    }

    let post = tx.query_row(
        &format!("{} WHERE p.id = ?1", POST_SELECT),
        params![post_id],
        post_from_row,
    )?;
    tx.commit()?;

    Ok(post)
}

/// All posts, or only `owner`'s, oldest first.
pub fn list_posts(conn: &Connection, owner: Option<i64>) -> AppResult<Vec<Post>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR p.user_id = ?1) ORDER BY p.created_at ASC, p.id ASC",
        POST_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![owner], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn find_post(conn: &Connection, post_id: i64) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(
            &format!("{} WHERE p.id = ?1", POST_SELECT),
            params![post_id],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

/// Delete a post owned by `user_id` together with its comments and location.
///
/// The ownership check and the deletes share one immediate transaction, so
/// a comment cannot land on the post between the check and the delete.
pub fn delete_post_owned(conn: &mut Connection, post_id: i64, user_id: i64) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let owner: Option<i64> = tx
        .query_row(
            "SELECT user_id FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        None => return Err(AppError::NotFound("Post not found".into())),
        Some(owner) if owner != user_id => {
            return Err(AppError::Forbidden(
                "You are not authorized to delete this post".into(),
            ));
        }
        Some(_) => {}
    }

    let comments = tx.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM locations WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    tx.commit()?;

    tracing::info!(post_id, comments, "Post deleted");
    Ok(())
}
