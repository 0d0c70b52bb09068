use crate::models::db_operations::{parse_db_time, time_column, to_db_time, DbError};
use crate::models::{ModerationStatus, Post, PostListing};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeMap;

const POST_COLUMNS: &str =
    "p.id, p.user_id, p.moderator_id, p.title, p.text, p.is_active, p.time, p.moderation_status, p.view_count";

const LISTING_COLUMNS: &str = "u.name,
    (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id AND v.value = 1) AS like_count,
    (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id AND v.value = -1) AS dislike_count,
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        moderator_id: row.get(2)?,
        title: row.get(3)?,
        text: row.get(4)?,
        is_active: row.get(5)?,
        time: time_column(row, 6)?,
        moderation_status: row.get(7)?,
        view_count: row.get(8)?,
    })
}

fn map_listing(row: &Row<'_>) -> rusqlite::Result<PostListing> {
    Ok(PostListing {
        post: map_post(row)?,
        author_name: row.get(9)?,
        like_count: row.get(10)?,
        dislike_count: row.get(11)?,
        comment_count: row.get(12)?,
    })
}

pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub text: String,
    pub is_active: bool,
    pub time: NaiveDateTime,
    pub moderation_status: ModerationStatus,
}

pub struct PostUpdate {
    pub title: String,
    pub text: String,
    pub is_active: bool,
    pub time: NaiveDateTime,
    /// `Some(status)` puts the post back into the shared queue with that status
    /// and releases the moderator claim. `None` keeps both untouched.
    pub reset_moderation: Option<ModerationStatus>,
}

/// Feed orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    Recent,
    Popular,
    Best,
    Early,
}

impl PostOrder {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.to_lowercase().as_str() {
            "recent" => Some(PostOrder::Recent),
            "popular" => Some(PostOrder::Popular),
            "best" => Some(PostOrder::Best),
            "early" => Some(PostOrder::Early),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            PostOrder::Recent => "p.time DESC, p.id DESC",
            PostOrder::Popular => "comment_count DESC, p.time DESC, p.id DESC",
            PostOrder::Best => "like_count DESC, p.time DESC, p.id DESC",
            PostOrder::Early => "p.time ASC, p.id ASC",
        }
    }
}

/// Status buckets of the author's own posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MyPostsStatus {
    Inactive,
    Pending,
    Declined,
    Published,
}

impl MyPostsStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "inactive" => Some(MyPostsStatus::Inactive),
            "pending" => Some(MyPostsStatus::Pending),
            "declined" => Some(MyPostsStatus::Declined),
            "published" => Some(MyPostsStatus::Published),
            _ => None,
        }
    }
}

/// Buckets of the moderation screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationListStatus {
    New,
    Declined,
    Accepted,
}

impl ModerationListStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "new" => Some(ModerationListStatus::New),
            "declined" => Some(ModerationListStatus::Declined),
            "accepted" => Some(ModerationListStatus::Accepted),
            _ => None,
        }
    }
}

/// A conjunction of SQL conditions over the `posts p` alias with their bound values.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

fn escape_like(query: &str) -> String {
    query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl PostFilter {
    fn with(mut self, clause: &str, values: Vec<Value>) -> Self {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
        self
    }

    /// Publicly visible posts: active, accepted and not scheduled in the future.
    pub fn visible(now: NaiveDateTime) -> Self {
        PostFilter::default().with(
            "p.is_active = 1 AND p.moderation_status = 'ACCEPTED' AND p.time <= ?",
            vec![Value::Text(to_db_time(&now))],
        )
    }

    /// Case-insensitive substring match on the plain text of title or body.
    pub fn matching(self, query: &str) -> Self {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        self.with(
            "(search_text(p.title) LIKE ? ESCAPE '\\' OR search_text(p.text) LIKE ? ESCAPE '\\')",
            vec![Value::Text(pattern.clone()), Value::Text(pattern)],
        )
    }

    pub fn on_date(self, date: NaiveDate) -> Self {
        self.with("date(p.time) = ?", vec![Value::Text(date.format("%Y-%m-%d").to_string())])
    }

    pub fn tagged(self, tag: &str) -> Self {
        self.with(
            "EXISTS (SELECT 1 FROM posts_tags pt JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id = p.id AND t.name_key = ?)",
            vec![Value::Text(tag.trim().to_lowercase())],
        )
    }

    pub fn by_author(self, user_id: i64) -> Self {
        self.with("p.user_id = ?", vec![Value::Integer(user_id)])
    }

    pub fn authored_by(user_id: i64, status: MyPostsStatus) -> Self {
        let base = PostFilter::default().by_author(user_id);
        match status {
            MyPostsStatus::Inactive => base.with("p.is_active = 0", vec![]),
            MyPostsStatus::Pending => base.with("p.is_active = 1 AND p.moderation_status = 'NEW'", vec![]),
            MyPostsStatus::Declined => base.with("p.is_active = 1 AND p.moderation_status = 'DECLINED'", vec![]),
            MyPostsStatus::Published => base.with("p.is_active = 1 AND p.moderation_status = 'ACCEPTED'", vec![]),
        }
    }

    pub fn moderation_queue(moderator_id: i64, status: ModerationListStatus) -> Self {
        let base = PostFilter::default().with("p.is_active = 1", vec![]);
        match status {
            ModerationListStatus::New => {
                base.with("p.moderation_status = 'NEW' AND p.moderator_id IS NULL", vec![])
            }
            ModerationListStatus::Declined => base.with(
                "p.moderation_status = 'DECLINED' AND p.moderator_id = ?",
                vec![Value::Integer(moderator_id)],
            ),
            ModerationListStatus::Accepted => base.with(
                "p.moderation_status = 'ACCEPTED' AND p.moderator_id = ?",
                vec![Value::Integer(moderator_id)],
            ),
        }
    }

    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }
}

// ====================================================================
// ========================= SINGLE POSTS =============================
// ====================================================================

pub fn insert_post(conn: &Connection, post: &NewPost) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO posts (user_id, title, text, is_active, time, moderation_status, view_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            post.user_id,
            post.title,
            post.text,
            post.is_active,
            to_db_time(&post.time),
            post.moderation_status
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_post(conn: &Connection, post_id: i64, update: &PostUpdate) -> Result<(), DbError> {
    let changed = match update.reset_moderation {
        Some(status) => conn.execute(
            "UPDATE posts SET title = ?1, text = ?2, is_active = ?3, time = ?4,
                 moderation_status = ?5, moderator_id = NULL
             WHERE id = ?6",
            params![update.title, update.text, update.is_active, to_db_time(&update.time), status, post_id],
        )?,
        None => conn.execute(
            "UPDATE posts SET title = ?1, text = ?2, is_active = ?3, time = ?4 WHERE id = ?5",
            params![update.title, update.text, update.is_active, to_db_time(&update.time), post_id],
        )?,
    };
    if changed == 0 {
        return Err(DbError::NotFound(format!("post {}", post_id)));
    }
    Ok(())
}

pub fn read_post(conn: &Connection, post_id: i64) -> Result<Option<Post>, DbError> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?1", POST_COLUMNS);
    Ok(conn.query_row(&sql, [post_id], map_post).optional()?)
}

pub fn read_post_listing(conn: &Connection, post_id: i64) -> Result<Option<PostListing>, DbError> {
    let sql = format!(
        "SELECT {}, {} FROM posts p JOIN users u ON u.id = p.user_id WHERE p.id = ?1",
        POST_COLUMNS, LISTING_COLUMNS
    );
    Ok(conn.query_row(&sql, [post_id], map_listing).optional()?)
}

pub fn increment_view_count(conn: &Connection, post_id: i64) -> Result<(), DbError> {
    conn.execute("UPDATE posts SET view_count = view_count + 1 WHERE id = ?1", [post_id])?;
    Ok(())
}

// ====================================================================
// ========================= POST LISTINGS ============================
// ====================================================================

pub fn count_posts(conn: &Connection, filter: &PostFilter) -> Result<i64, DbError> {
    let sql = format!("SELECT COUNT(*) FROM posts p WHERE {}", filter.where_sql());
    Ok(conn.query_row(&sql, params_from_iter(filter.values.iter()), |row| row.get(0))?)
}

pub fn read_post_listings(
    conn: &Connection,
    filter: &PostFilter,
    order: PostOrder,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostListing>, DbError> {
    let sql = format!(
        "SELECT {}, {} FROM posts p JOIN users u ON u.id = p.user_id
         WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        POST_COLUMNS,
        LISTING_COLUMNS,
        filter.where_sql(),
        order.sql()
    );

    let mut values = filter.values.clone();
    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));

    let mut stmt = conn.prepare(&sql)?;
    let listings = stmt
        .query_map(params_from_iter(values.iter()), map_listing)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(listings)
}

/// Active NEW posts nobody has claimed yet.
pub fn count_awaiting_moderation(conn: &Connection) -> Result<i64, DbError> {
    count_posts(conn, &PostFilter::moderation_queue(0, ModerationListStatus::New))
}

// ====================================================================
// =========================== MODERATION =============================
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Applied,
    ClaimedByOther,
    NotFound,
}

/// Sets the moderation status and claims the post for `moderator_id`, unless
/// another moderator has already claimed it. The check and the write happen in one
/// conditional UPDATE under an IMMEDIATE transaction.
pub fn apply_moderation(
    conn: &mut Connection,
    post_id: i64,
    moderator_id: i64,
    status: ModerationStatus,
) -> Result<ClaimOutcome, DbError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let changed = tx.execute(
        "UPDATE posts SET moderation_status = ?1, moderator_id = ?2
         WHERE id = ?3 AND (moderator_id IS NULL OR moderator_id = ?2)",
        params![status, moderator_id, post_id],
    )?;

    let outcome = if changed == 1 {
        ClaimOutcome::Applied
    } else {
        let exists: bool = tx.query_row("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)", [post_id], |row| {
            row.get(0)
        })?;
        if exists {
            ClaimOutcome::ClaimedByOther
        } else {
            ClaimOutcome::NotFound
        }
    };

    tx.commit()?;
    Ok(outcome)
}

// ====================================================================
// ===================== CALENDAR & STATISTICS ========================
// ====================================================================

pub fn read_publication_years(conn: &Connection, now: NaiveDateTime) -> Result<Vec<i32>, DbError> {
    let filter = PostFilter::visible(now);
    let sql = format!(
        "SELECT DISTINCT CAST(strftime('%Y', p.time) AS INTEGER) AS year FROM posts p WHERE {} ORDER BY year DESC",
        filter.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let years = stmt
        .query_map(params_from_iter(filter.values.iter()), |row| row.get(0))?
        .collect::<Result<Vec<i32>, _>>()?;
    Ok(years)
}

/// Visible post count per `YYYY-MM-DD` within `year`.
pub fn count_posts_per_day(conn: &Connection, now: NaiveDateTime, year: i32) -> Result<BTreeMap<String, i64>, DbError> {
    let filter = PostFilter::visible(now);
    let sql = format!(
        "SELECT date(p.time) AS day, COUNT(*) FROM posts p
         WHERE {} AND strftime('%Y', p.time) = ? GROUP BY day",
        filter.where_sql()
    );
    let mut values = filter.values.clone();
    values.push(Value::Text(format!("{:04}", year)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut days = BTreeMap::new();
    for row in rows {
        let (day, count) = row?;
        days.insert(day, count);
    }
    Ok(days)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostStatistics {
    pub posts_count: i64,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub views_count: i64,
    pub first_publication: Option<NaiveDateTime>,
}

/// Aggregates over visible posts, optionally restricted to one author. Likes and
/// dislikes are the votes those posts received.
pub fn read_statistics(conn: &Connection, now: NaiveDateTime, author_id: Option<i64>) -> Result<PostStatistics, DbError> {
    let filter = match author_id {
        Some(id) => PostFilter::visible(now).by_author(id),
        None => PostFilter::visible(now),
    };

    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(p.view_count), 0), MIN(p.time) FROM posts p WHERE {}",
        filter.where_sql()
    );
    let (posts_count, views_count, first): (i64, i64, Option<String>) =
        conn.query_row(&sql, params_from_iter(filter.values.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

    let votes_sql = format!(
        "SELECT
            COALESCE(SUM(CASE WHEN v.value = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN v.value = -1 THEN 1 ELSE 0 END), 0)
         FROM votes v JOIN posts p ON p.id = v.post_id WHERE {}",
        filter.where_sql()
    );
    let (likes_count, dislikes_count): (i64, i64) =
        conn.query_row(&votes_sql, params_from_iter(filter.values.iter()), |row| Ok((row.get(0)?, row.get(1)?)))?;

    let first_publication = match first {
        Some(raw) => Some(parse_db_time(&raw).map_err(|e| {
            DbError::Rusqlite(rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))
        })?),
        None => None,
    };

    Ok(PostStatistics { posts_count, likes_count, dislikes_count, views_count, first_publication })
}
