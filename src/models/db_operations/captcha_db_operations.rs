use crate::models::db_operations::{time_column, to_db_time, DbError};
use crate::models::CaptchaCode;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_captcha(conn: &Connection, code: &str, secret_code: &str, now: NaiveDateTime) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO captcha_codes (code, secret_code, time) VALUES (?1, ?2, ?3)",
        params![code, secret_code, to_db_time(&now)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_captcha_by_secret(conn: &Connection, secret_code: &str) -> Result<Option<CaptchaCode>, DbError> {
    Ok(conn
        .query_row(
            "SELECT id, code, secret_code, time FROM captcha_codes WHERE secret_code = ?1",
            [secret_code],
            |row| {
                Ok(CaptchaCode {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    secret_code: row.get(2)?,
                    time: time_column(row, 3)?,
                })
            },
        )
        .optional()?)
}

/// Removes every captcha generated before `cutoff`. Returns how many were dropped.
pub fn delete_outdated(conn: &Connection, cutoff: NaiveDateTime) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM captcha_codes WHERE time < ?1", [to_db_time(&cutoff)])?)
}

pub fn delete_by_secret(conn: &Connection, secret_code: &str) -> Result<(), DbError> {
    conn.execute("DELETE FROM captcha_codes WHERE secret_code = ?1", [secret_code])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::{backdate_captcha, now, open_db};
    use chrono::Duration;

    #[test]
    fn outdated_captchas_are_removed() {
        let conn = open_db();
        insert_captcha(&conn, "abc123", "old-secret", now()).unwrap();
        insert_captcha(&conn, "xyz789", "fresh-secret", now()).unwrap();
        backdate_captcha(&conn, "old-secret", now() - Duration::hours(2));

        assert_eq!(delete_outdated(&conn, now() - Duration::hours(1)).unwrap(), 1);
        assert!(read_captcha_by_secret(&conn, "old-secret").unwrap().is_none());

        let fresh = read_captcha_by_secret(&conn, "fresh-secret").unwrap().unwrap();
        assert!(fresh.is_valid_code("xyz789"));
        assert!(!fresh.is_valid_code("XYZ789"));
    }

    #[test]
    fn captcha_can_be_consumed() {
        let conn = open_db();
        insert_captcha(&conn, "abc123", "secret", now()).unwrap();
        delete_by_secret(&conn, "secret").unwrap();
        assert!(read_captcha_by_secret(&conn, "secret").unwrap().is_none());
    }
}
