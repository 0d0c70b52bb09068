use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workflow state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModerationStatus {
    New,
    Accepted,
    Declined,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::New => "NEW",
            ModerationStatus::Accepted => "ACCEPTED",
            ModerationStatus::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ModerationStatus::New),
            "ACCEPTED" => Ok(ModerationStatus::Accepted),
            "DECLINED" => Ok(ModerationStatus::Declined),
            other => Err(format!("unknown moderation status '{}'", other)),
        }
    }
}

impl ToSql for ModerationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ModerationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A moderator's verdict on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationDecision {
    Accept,
    Decline,
}

impl ModerationDecision {
    pub fn resulting_status(self) -> ModerationStatus {
        match self {
            ModerationDecision::Accept => ModerationStatus::Accepted,
            ModerationDecision::Decline => ModerationStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Like,
    Dislike,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(VoteValue::Like),
            -1 => Some(VoteValue::Dislike),
            _ => None,
        }
    }
}

/// What happened to a user's vote after a like/dislike submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    Replaced,
    Removed,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_moderator: bool,
    pub photo: Option<String>,
    pub code: Option<String>,
    pub reg_time: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub moderator_id: Option<i64>,
    pub title: String,
    pub text: String,
    pub is_active: bool,
    pub time: NaiveDateTime,
    pub moderation_status: ModerationStatus,
    pub view_count: i64,
}

impl Post {
    /// Public visibility: active, accepted and already published.
    pub fn is_visible_at(&self, now: NaiveDateTime) -> bool {
        self.is_active && self.moderation_status == ModerationStatus::Accepted && self.time <= now
    }
}

/// A post row joined with its author and vote/comment counters.
#[derive(Debug, Clone)]
pub struct PostListing {
    pub post: Post,
    pub author_name: String,
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagWeight {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub text: String,
    pub time: NaiveDateTime,
    pub author_name: String,
    pub author_photo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Vote {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub value: VoteValue,
    pub time: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct CaptchaCode {
    pub id: i64,
    pub code: String,
    pub secret_code: String,
    pub time: NaiveDateTime,
}

impl CaptchaCode {
    pub fn is_valid_code(&self, user_code: &str) -> bool {
        self.code == user_code
    }
}

/// Global blog flags, loaded once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalSettings {
    #[serde(rename = "MULTIUSER_MODE")]
    pub multiuser_mode: bool,
    #[serde(rename = "POST_PREMODERATION")]
    pub post_premoderation: bool,
    #[serde(rename = "STATISTICS_IS_PUBLIC")]
    pub statistics_is_public: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            multiuser_mode: true,
            post_premoderation: true,
            statistics_is_public: true,
        }
    }
}

/// Codes of the rows in the `global_settings` table.
pub mod setting_codes {
    pub const MULTIUSER_MODE: &str = "MULTIUSER_MODE";
    pub const POST_PREMODERATION: &str = "POST_PREMODERATION";
    pub const STATISTICS_IS_PUBLIC: &str = "STATISTICS_IS_PUBLIC";
}

pub mod comment_tree;
pub mod db_operations;
pub mod dto;
