use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::auth::oauth::OAuthProfile;
use crate::db::models::User;
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Insert a user. A username collision, whether caught up front or by the
/// UNIQUE constraint under a race, is reported as `Conflict`.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> AppResult<User> {
    if find_by_username(conn, username)?.is_some() {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let inserted = conn.execute(
        "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
        params![username, email, password_hash],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::Conflict("User already exists".into()));
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

fn find_linked(conn: &Connection, provider: &str, sub: &str) -> AppResult<Option<User>> {
    let linked: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM social_accounts WHERE provider = ?1 AND provider_user_id = ?2",
            params![provider, sub],
            |row| row.get(0),
        )
        .optional()?;

    match linked {
        Some(user_id) => find_by_id(conn, user_id)?
            .map(Some)
            .ok_or_else(|| AppError::Internal("linked user no longer exists".into())),
        None => Ok(None),
    }
}

/// Resolve the local user linked to a provider account, creating and
/// linking one on first sign-in.
pub fn find_or_create_linked(
    conn: &mut Connection,
    provider: &str,
    profile: &OAuthProfile,
) -> AppResult<User> {
    if let Some(user) = find_linked(conn, provider, &profile.sub)? {
        return Ok(user);
    }

    let base = profile
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("user")
        .to_string();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // A concurrent first sign-in may have linked the account since the lookup above.
    if let Some(user) = find_linked(&tx, provider, &profile.sub)? {
        return Ok(user);
    }

    let mut username = base.clone();
    let mut attempt = 0;
    while find_by_username(&tx, &username)?.is_some() {
        attempt += 1;
        username = format!("{}-{}", base, short_suffix(&profile.sub, attempt));
    }

    tx.execute(
        "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, NULL)",
        params![username, profile.email],
    )?;
    let user_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO social_accounts (user_id, provider, provider_user_id) VALUES (?1, ?2, ?3)",
        params![user_id, provider, profile.sub],
    )?;
    tx.commit()?;

    tracing::info!(user_id, provider, "linked new social account");
    find_by_id(conn, user_id)?
        .ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

fn short_suffix(sub: &str, attempt: u32) -> String {
    let tail: String = sub
        .chars()
        .rev()
        .take(6)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if attempt == 1 {
        tail
    } else {
        format!("{}{}", tail, attempt)
    }
}
