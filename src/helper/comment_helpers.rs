use crate::config::PostsConfig;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::helper::sanitization_helpers::sanitize_html;
use crate::helper::validators::validate_comment_text;
use crate::models::comment_tree::CommentTree;
use crate::models::db_operations::comments_db_operations::{self, NewComment};
use crate::models::db_operations::posts_db_operations;
use crate::models::dto::{format_time, CommentAuthor, CommentDto};
use crate::models::{Comment, User};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub parent_id: Option<i64>,
    pub post_id: i64,
    pub text: String,
}

/// Flattens a post's comments into thread order, each carrying its depth.
pub fn threaded_dtos(comments: Vec<Comment>) -> Vec<CommentDto> {
    let tree = CommentTree::build(comments);
    tree.threaded()
        .into_iter()
        .map(|(depth, comment)| CommentDto {
            id: comment.id,
            parent_id: comment.parent_id,
            depth,
            text: comment.text.clone(),
            time: format_time(&comment.time),
            user: CommentAuthor {
                id: comment.user_id,
                name: comment.author_name.clone(),
                photo: comment.author_photo.clone(),
            },
        })
        .collect()
}

pub fn add_comment(
    conn: &Connection,
    user: &User,
    config: &PostsConfig,
    request: &CommentRequest,
    now: NaiveDateTime,
) -> ApiResult<i64> {
    // Hidden posts take comments only from the people who can see them.
    let commentable = posts_db_operations::read_post(conn, request.post_id)?
        .map_or(false, |post| post.is_visible_at(now) || user.is_moderator || user.id == post.user_id);
    if !commentable {
        return Err(ApiError::BadRequest(format!("There's no post with id={}.", request.post_id)));
    }

    if let Some(parent_id) = request.parent_id {
        match comments_db_operations::read_comment_post_id(conn, parent_id)? {
            Some(post_id) if post_id == request.post_id => {}
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "There's no comment with id={} on post {}.",
                    parent_id, request.post_id
                )))
            }
        }
    }

    let text = sanitize_html(&request.text);
    let mut errors = ValidationErrors::new();
    validate_comment_text(&text, config, &mut errors);
    errors.into_result()?;

    let id = comments_db_operations::insert_comment(
        conn,
        &NewComment { post_id: request.post_id, user_id: user.id, parent_id: request.parent_id, text: &text, time: now },
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::db_operations::test_support::{add_post, add_user, now, open_db};
    use crate::models::db_operations::users_db_operations;
    use crate::models::ModerationStatus;

    fn setup() -> (Connection, User, i64, PostsConfig) {
        let conn = open_db();
        let author_id = add_user(&conn, "author@example.com", false);
        let user = users_db_operations::read_user_by_id(&conn, author_id).unwrap().unwrap();
        let post_id = add_post(&conn, author_id, true, ModerationStatus::Accepted, 10);
        let config = Config::with_paths("/tmp/data", "/tmp/upload").unwrap().posts;
        (conn, user, post_id, config)
    }

    #[test]
    fn replies_are_threaded_under_their_parent() {
        let (conn, user, post_id, config) = setup();
        let root = add_comment(&conn, &user, &config, &CommentRequest { parent_id: None, post_id, text: "Root comment".into() }, now())
            .unwrap();
        add_comment(&conn, &user, &config, &CommentRequest { parent_id: None, post_id, text: "Second root".into() }, now())
            .unwrap();
        let reply = add_comment(
            &conn,
            &user,
            &config,
            &CommentRequest { parent_id: Some(root), post_id, text: "A reply".into() },
            now(),
        )
        .unwrap();

        let dtos = threaded_dtos(comments_db_operations::read_post_comments(&conn, post_id).unwrap());
        let order: Vec<(i64, usize)> = dtos.iter().map(|c| (c.id, c.depth)).collect();
        assert_eq!(order[0], (root, 0));
        assert_eq!(order[1], (reply, 1));
        assert_eq!(dtos[1].parent_id, Some(root));
    }

    #[test]
    fn parent_must_belong_to_the_same_post() {
        let (conn, user, post_id, config) = setup();
        let other_post = add_post(&conn, user.id, true, ModerationStatus::Accepted, 10);
        let foreign = add_comment(
            &conn,
            &user,
            &config,
            &CommentRequest { parent_id: None, post_id: other_post, text: "Elsewhere".into() },
            now(),
        )
        .unwrap();

        let result = add_comment(
            &conn,
            &user,
            &config,
            &CommentRequest { parent_id: Some(foreign), post_id, text: "Wrong thread".into() },
            now(),
        );
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        let missing_post = add_comment(&conn, &user, &config, &CommentRequest { parent_id: None, post_id: 999, text: "Nowhere".into() }, now());
        assert!(matches!(missing_post, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn hidden_posts_refuse_comments_from_strangers() {
        let (conn, author, _, config) = setup();
        let pending = add_post(&conn, author.id, false, ModerationStatus::New, 10);
        let stranger_id = add_user(&conn, "stranger@example.com", false);
        let stranger = users_db_operations::read_user_by_id(&conn, stranger_id).unwrap().unwrap();
        let moderator_id = add_user(&conn, "mod@example.com", true);
        let moderator = users_db_operations::read_user_by_id(&conn, moderator_id).unwrap().unwrap();
        let request = CommentRequest { parent_id: None, post_id: pending, text: "Sneaky comment".into() };

        let refused = add_comment(&conn, &stranger, &config, &request, now());
        assert!(matches!(refused, Err(ApiError::BadRequest(_))));
        assert!(comments_db_operations::read_post_comments(&conn, pending).unwrap().is_empty());

        assert!(add_comment(&conn, &author, &config, &request, now()).is_ok());
        assert!(add_comment(&conn, &moderator, &config, &request, now()).is_ok());
    }

    #[test]
    fn markup_does_not_count_towards_length() {
        let (conn, user, post_id, config) = setup();
        let result = add_comment(&conn, &user, &config, &CommentRequest { parent_id: None, post_id, text: "<b>a</b>".into() }, now());
        match result {
            Err(ApiError::Validation(errors)) => assert!(errors.contains("text")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
