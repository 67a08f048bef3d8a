//! Comment persistence. Comments live and die with their post.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};

pub const MAX_COMMENT_CHARS: usize = 500;

const COMMENT_SELECT: &str = "SELECT c.id, c.content, c.post_id, c.user_id, u.username, c.created_at
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        post_id: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Trimmed comment text, rejected when blank or too long.
pub fn validate_content(content: &str) -> AppResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::BadRequest(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(content.to_string())
}

pub fn add_comment(
    conn: &Connection,
    post_id: i64,
    user_id: i64,
    content: &str,
) -> AppResult<Comment> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM posts WHERE id = ?1",
            params![post_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(AppError::NotFound("Post not found".into()));
    }

    // The post can still be deleted between the check and the insert; the
    // foreign key catches that.
    let inserted = conn.execute(
        "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, content],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::NotFound("Post not found".into()));
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    let comment = conn.query_row(
        &format!("{} WHERE c.id = ?1", COMMENT_SELECT),
        params![id],
        comment_from_row,
    )?;
    Ok(comment)
}

/// Comments on a post, oldest first. Unknown posts simply have none.
pub fn list_comments(conn: &Connection, post_id: i64) -> AppResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC",
        COMMENT_SELECT
    ))?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}
