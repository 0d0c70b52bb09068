use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;
use thiserror::Error;

pub mod captcha_db_operations;
pub mod comments_db_operations;
pub mod posts_db_operations;
pub mod settings_db_operations;
pub mod tags_db_operations;
pub mod users_db_operations;
pub mod votes_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("Item not found in database: {0}")]
    NotFound(String),
}

/// All timestamps are stored as UTC text in this format, so SQL `date()`,
/// `strftime()` and plain string comparison all work on them.
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_db_time(time: &NaiveDateTime) -> String {
    time.format(DB_TIME_FORMAT).to_string()
}

pub fn parse_db_time(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DB_TIME_FORMAT)
}

/// Reads a timestamp column written by [`to_db_time`].
pub fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
