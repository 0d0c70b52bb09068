use crate::models::db_operations::{time_column, to_db_time, DbError};
use crate::models::Comment;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

pub struct NewComment<'a> {
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub text: &'a str,
    pub time: NaiveDateTime,
}

pub fn insert_comment(conn: &Connection, comment: &NewComment<'_>) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO comments (post_id, user_id, parent_id, text, time) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![comment.post_id, comment.user_id, comment.parent_id, comment.text, to_db_time(&comment.time)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Post the comment belongs to, if the comment exists.
pub fn read_comment_post_id(conn: &Connection, comment_id: i64) -> Result<Option<i64>, DbError> {
    Ok(conn
        .query_row("SELECT post_id FROM comments WHERE id = ?1", [comment_id], |row| row.get(0))
        .optional()?)
}

pub fn read_post_comments(conn: &Connection, post_id: i64) -> Result<Vec<Comment>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.post_id, c.user_id, c.parent_id, c.text, c.time, u.name, u.photo
         FROM comments c JOIN users u ON u.id = c.user_id
         WHERE c.post_id = ?1 ORDER BY c.time, c.id",
    )?;
    let comments = stmt
        .query_map([post_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                parent_id: row.get(3)?,
                text: row.get(4)?,
                time: time_column(row, 5)?,
                author_name: row.get(6)?,
                author_photo: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::{add_post, add_user, now, open_db};
    use crate::models::ModerationStatus;

    #[test]
    fn replies_are_stored_with_their_parent() {
        let conn = open_db();
        let author = add_user(&conn, "author@example.com", false);
        let post = add_post(&conn, author, true, ModerationStatus::Accepted, 5);

        let root = insert_comment(
            &conn,
            &NewComment { post_id: post, user_id: author, parent_id: None, text: "First!", time: now() },
        )
        .unwrap();
        let reply = insert_comment(
            &conn,
            &NewComment { post_id: post, user_id: author, parent_id: Some(root), text: "Reply", time: now() },
        )
        .unwrap();

        assert_eq!(read_comment_post_id(&conn, reply).unwrap(), Some(post));
        assert_eq!(read_comment_post_id(&conn, 9999).unwrap(), None);

        let comments = read_post_comments(&conn, post).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].parent_id, Some(root));
        assert_eq!(comments[0].author_name, "Tester");
    }
}
