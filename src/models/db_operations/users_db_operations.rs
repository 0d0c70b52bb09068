use crate::models::db_operations::{time_column, to_db_time, DbError};
use crate::models::User;
use bcrypt::{hash, verify};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, email, name, password_hash, is_moderator, photo, code, reg_time";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        is_moderator: row.get(4)?,
        photo: row.get(5)?,
        code: row.get(6)?,
        reg_time: time_column(row, 7)?,
    })
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, DbError> {
    Ok(hash(password, cost)?)
}

pub fn create_user(
    conn: &Connection,
    email: &str,
    name: &str,
    password: &str,
    cost: u32,
    now: NaiveDateTime,
) -> Result<i64, DbError> {
    let hashed_password = hash_password(password, cost)?;
    conn.execute(
        "INSERT INTO users (email, name, password_hash, is_moderator, reg_time) VALUES (?1, ?2, ?3, 0, ?4)",
        params![email, name, hashed_password, to_db_time(&now)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [user_id], map_user).optional()?)
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email], map_user).optional()?)
}

pub fn read_user_by_code(conn: &Connection, code: &str) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE code = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [code], map_user).optional()?)
}

pub fn email_is_registered(conn: &Connection, email: &str) -> Result<bool, DbError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        [email],
        |row| row.get(0),
    )?)
}

/// Returns the user when the e-mail exists and the password matches its hash.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Result<Option<User>, DbError> {
    match read_user_by_email(conn, email)? {
        Some(user) if verify(password, &user.password_hash).unwrap_or(false) => Ok(Some(user)),
        _ => Ok(None),
    }
}

pub fn set_restore_code(conn: &Connection, user_id: i64, code: &str) -> Result<(), DbError> {
    conn.execute("UPDATE users SET code = ?1 WHERE id = ?2", params![code, user_id])?;
    Ok(())
}

/// Stores a new password and clears the restore code.
pub fn reset_password(conn: &Connection, user_id: i64, new_password: &str, cost: u32) -> Result<(), DbError> {
    let hashed_password = hash_password(new_password, cost)?;
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1, code = NULL WHERE id = ?2",
        params![hashed_password, user_id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub fn update_profile(
    conn: &Connection,
    user_id: i64,
    name: &str,
    email: &str,
    photo: Option<&str>,
    new_password: Option<&str>,
    cost: u32,
) -> Result<(), DbError> {
    if let Some(password) = new_password.filter(|p| !p.is_empty()) {
        let hashed_password = hash_password(password, cost)?;
        conn.execute(
            "UPDATE users SET name = ?1, email = ?2, photo = ?3, password_hash = ?4 WHERE id = ?5",
            params![name, email, photo, hashed_password, user_id],
        )?;
        return Ok(());
    }

    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, photo = ?3 WHERE id = ?4",
        params![name, email, photo, user_id],
    )?;
    Ok(())
}

pub fn set_moderator(conn: &Connection, email: &str, is_moderator: bool) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE users SET is_moderator = ?1 WHERE email = ?2",
        params![is_moderator, email],
    )?)
}

pub fn read_all_moderators(conn: &Connection) -> Result<Vec<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE is_moderator = 1 ORDER BY email", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt.query_map([], map_user)?.collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
