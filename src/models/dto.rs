//! JSON shapes returned by the API.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::TagWeight;

pub const DTO_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(DTO_TIME_FORMAT).to_string()
}

#[derive(Debug, Serialize)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub name: String,
    pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub depth: usize,
    pub text: String,
    pub time: String,
    pub user: CommentAuthor,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummaryDto {
    pub id: i64,
    pub title: String,
    pub time: String,
    pub active: bool,
    pub user: UserRef,
    pub view_count: i64,
    pub comment_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub announce: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPostDto {
    pub id: i64,
    pub title: String,
    pub time: String,
    pub active: bool,
    pub user: UserRef,
    pub view_count: i64,
    pub comment_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub text: String,
    pub comments: Vec<CommentDto>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModeratedPostDto {
    pub id: i64,
    pub time: String,
    pub user: UserRef,
    pub title: String,
    pub announce: String,
}

/// A page of posts plus the total number of matching posts.
#[derive(Debug, Serialize)]
pub struct PostsPage<T: Serialize> {
    pub count: i64,
    pub posts: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct TagsDto {
    pub tags: Vec<TagWeight>,
}

#[derive(Debug, Serialize)]
pub struct CalendarDto {
    pub years: Vec<i32>,
    pub posts: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsDto {
    pub posts_count: i64,
    pub likes_count: i64,
    pub dislikes_count: i64,
    pub views_count: i64,
    pub first_publication: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserDto {
    pub id: i64,
    pub name: String,
    pub photo: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub result: bool,
    pub user: AuthUserDto,
}

#[derive(Debug, Serialize)]
pub struct CaptchaDto {
    pub secret: String,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct CommentCreatedDto {
    pub id: i64,
}
