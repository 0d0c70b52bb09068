use crate::models::db_operations::{to_db_time, DbError};
use crate::models::{VoteOutcome, VoteValue};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Applies a like/dislike for `user_id`. A repeat of the same vote withdraws it,
/// the opposite vote replaces it. Runs in an IMMEDIATE transaction so concurrent
/// submissions from one user serialize on the write lock.
pub fn toggle_vote(
    conn: &mut Connection,
    post_id: i64,
    user_id: i64,
    value: VoteValue,
    now: NaiveDateTime,
) -> Result<VoteOutcome, DbError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<(i64, i64)> = tx
        .query_row(
            "SELECT id, value FROM votes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let outcome = match existing {
        Some((vote_id, stored)) if stored == value.as_i64() => {
            tx.execute("DELETE FROM votes WHERE id = ?1", [vote_id])?;
            VoteOutcome::Removed
        }
        Some((vote_id, _)) => {
            tx.execute(
                "UPDATE votes SET value = ?1, time = ?2 WHERE id = ?3",
                params![value.as_i64(), to_db_time(&now), vote_id],
            )?;
            VoteOutcome::Replaced
        }
        None => {
            tx.execute(
                "INSERT INTO votes (post_id, user_id, value, time) VALUES (?1, ?2, ?3, ?4)",
                params![post_id, user_id, value.as_i64(), to_db_time(&now)],
            )?;
            VoteOutcome::Recorded
        }
    };

    tx.commit()?;
    Ok(outcome)
}

pub fn read_user_vote(conn: &Connection, post_id: i64, user_id: i64) -> Result<Option<VoteValue>, DbError> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM votes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(VoteValue::from_i64))
}
