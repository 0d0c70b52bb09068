use crate::config::PostsConfig;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::helper::comment_helpers;
use crate::helper::sanitization_helpers::{announce, plain_text, sanitize_html};
use crate::helper::validators::{parse_post_time, validate_text, validate_title};
use crate::models::db_operations::posts_db_operations::{
    self, ClaimOutcome, NewPost, PostFilter, PostOrder, PostUpdate,
};
use crate::models::db_operations::{comments_db_operations, tags_db_operations, votes_db_operations};
use crate::models::dto::{format_time, FullPostDto, ModeratedPostDto, PostSummaryDto, PostsPage, UserRef};
use crate::models::{GlobalSettings, ModerationDecision, ModerationStatus, PostListing, User, VoteOutcome, VoteValue};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Offset/limit after normalization: negative offsets become 0, non-positive limits
/// fall back to [`DEFAULT_PAGE_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset: offset.max(0),
            limit: if limit > 0 { limit } else { DEFAULT_PAGE_LIMIT },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostRequest {
    pub time: String,
    pub active: i64,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub text: String,
}

/// Result of a create or edit.
#[derive(Debug, Clone)]
pub struct SavedPost {
    pub id: i64,
    pub title: String,
    pub status: ModerationStatus,
    pub is_active: bool,
}

impl SavedPost {
    /// Whether moderators should hear about this save.
    pub fn awaits_moderation(&self) -> bool {
        self.is_active && self.status == ModerationStatus::New
    }
}

fn user_ref(listing: &PostListing) -> UserRef {
    UserRef { id: listing.post.user_id, name: listing.author_name.clone() }
}

pub fn summary_dto(listing: &PostListing, config: &PostsConfig) -> PostSummaryDto {
    PostSummaryDto {
        id: listing.post.id,
        title: listing.post.title.clone(),
        time: format_time(&listing.post.time),
        active: listing.post.is_active,
        user: user_ref(listing),
        view_count: listing.post.view_count,
        comment_count: listing.comment_count,
        like_count: listing.like_count,
        dislike_count: listing.dislike_count,
        announce: announce(&listing.post.text, config.announce_length),
    }
}

pub fn moderated_dto(listing: &PostListing, config: &PostsConfig) -> ModeratedPostDto {
    ModeratedPostDto {
        id: listing.post.id,
        time: format_time(&listing.post.time),
        user: user_ref(listing),
        title: listing.post.title.clone(),
        announce: announce(&listing.post.text, config.announce_length),
    }
}

pub fn fetch_posts_page(
    conn: &Connection,
    filter: &PostFilter,
    order: PostOrder,
    page: Pagination,
    config: &PostsConfig,
) -> ApiResult<PostsPage<PostSummaryDto>> {
    let count = posts_db_operations::count_posts(conn, filter)?;
    let posts = posts_db_operations::read_post_listings(conn, filter, order, page.limit, page.offset)?
        .iter()
        .map(|listing| summary_dto(listing, config))
        .collect();
    Ok(PostsPage { count, posts })
}

pub fn fetch_moderation_page(
    conn: &Connection,
    filter: &PostFilter,
    page: Pagination,
    config: &PostsConfig,
) -> ApiResult<PostsPage<ModeratedPostDto>> {
    let count = posts_db_operations::count_posts(conn, filter)?;
    let posts = posts_db_operations::read_post_listings(conn, filter, PostOrder::Recent, page.limit, page.offset)?
        .iter()
        .map(|listing| moderated_dto(listing, config))
        .collect();
    Ok(PostsPage { count, posts })
}

/// Full post view. Hidden posts are only shown to their author and moderators, and
/// their views are not counted.
pub fn fetch_post_for_viewer(
    conn: &Connection,
    post_id: i64,
    viewer: Option<&User>,
    now: NaiveDateTime,
) -> ApiResult<FullPostDto> {
    let not_found = || ApiError::NotFound(format!("Post not found. There's no post with id={}.", post_id));
    let mut listing = posts_db_operations::read_post_listing(conn, post_id)?.ok_or_else(not_found)?;

    let privileged = viewer.map_or(false, |u| u.is_moderator || u.id == listing.post.user_id);
    if !listing.post.is_visible_at(now) && !privileged {
        return Err(not_found());
    }

    if !privileged {
        posts_db_operations::increment_view_count(conn, post_id)?;
        listing.post.view_count += 1;
    }

    let comments = comments_db_operations::read_post_comments(conn, post_id)?;
    let tags = tags_db_operations::read_post_tags(conn, post_id)?;

    Ok(FullPostDto {
        id: listing.post.id,
        title: listing.post.title.clone(),
        time: format_time(&listing.post.time),
        active: listing.post.is_active,
        user: user_ref(&listing),
        view_count: listing.post.view_count,
        comment_count: listing.comment_count,
        like_count: listing.like_count,
        dislike_count: listing.dislike_count,
        text: listing.post.text,
        comments: comment_helpers::threaded_dtos(comments),
        tags,
    })
}

struct CleanPost {
    title: String,
    text: String,
    is_active: bool,
    time: NaiveDateTime,
}

fn validate_post_request(request: &PostRequest, config: &PostsConfig, now: NaiveDateTime) -> ApiResult<CleanPost> {
    let mut errors = ValidationErrors::new();

    validate_title(&request.title, config, &mut errors);
    validate_text(&request.text, config, &mut errors);
    if request.active != 0 && request.active != 1 {
        errors.add("active", "Wrong value. Allowed values: 0, 1.");
    }
    let time = parse_post_time(&request.time);
    if time.is_none() {
        errors.add("time", "Wrong date format. Expected: yyyy-mm-ddThh:mm.");
    }
    errors.into_result()?;

    let requested = time.unwrap_or(now);
    Ok(CleanPost {
        title: plain_text(&request.title),
        text: sanitize_html(&request.text),
        is_active: request.active == 1,
        time: if requested <= now { now } else { requested },
    })
}

fn status_for_author(settings: &GlobalSettings) -> ModerationStatus {
    if settings.post_premoderation {
        ModerationStatus::New
    } else {
        ModerationStatus::Accepted
    }
}

pub fn create_post(
    conn: &mut Connection,
    author: &User,
    settings: &GlobalSettings,
    config: &PostsConfig,
    request: &PostRequest,
    now: NaiveDateTime,
) -> ApiResult<SavedPost> {
    if !settings.multiuser_mode && !author.is_moderator {
        return Err(ApiError::Forbidden("Only moderators can publish posts in single-user mode.".to_string()));
    }
    let clean = validate_post_request(request, config, now)?;
    let status = status_for_author(settings);

    let tx = conn.transaction()?;
    let id = posts_db_operations::insert_post(
        &tx,
        &NewPost {
            user_id: author.id,
            title: clean.title.clone(),
            text: clean.text,
            is_active: clean.is_active,
            time: clean.time,
            moderation_status: status,
        },
    )?;
    tags_db_operations::update_post_tags(&tx, id, &request.tags)?;
    tx.commit()?;

    log::info!("Post {} created by user {} with status {}", id, author.id, status);
    Ok(SavedPost { id, title: clean.title, status, is_active: clean.is_active })
}

/// Edits a post. A non-moderator author sends the post back to moderation (or
/// straight to ACCEPTED when pre-moderation is off); moderators keep the status.
pub fn edit_post(
    conn: &mut Connection,
    editor: &User,
    post_id: i64,
    settings: &GlobalSettings,
    config: &PostsConfig,
    request: &PostRequest,
    now: NaiveDateTime,
) -> ApiResult<SavedPost> {
    let post = posts_db_operations::read_post(conn, post_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Post not found. There's no post with id={}.", post_id)))?;

    let is_author = post.user_id == editor.id;
    if !is_author && !editor.is_moderator {
        return Err(ApiError::Forbidden("You can only edit your own posts.".to_string()));
    }
    let clean = validate_post_request(request, config, now)?;

    let reset_moderation = if is_author && !editor.is_moderator {
        Some(status_for_author(settings))
    } else {
        None
    };
    let status = reset_moderation.unwrap_or(post.moderation_status);

    let tx = conn.transaction()?;
    posts_db_operations::update_post(
        &tx,
        post_id,
        &PostUpdate {
            title: clean.title.clone(),
            text: clean.text,
            is_active: clean.is_active,
            time: clean.time,
            reset_moderation,
        },
    )?;
    tags_db_operations::update_post_tags(&tx, post_id, &request.tags)?;
    tx.commit()?;

    log::info!("Post {} edited by user {}", post_id, editor.id);
    Ok(SavedPost { id: post_id, title: clean.title, status, is_active: clean.is_active })
}

pub fn moderate_post(
    conn: &mut Connection,
    moderator: &User,
    post_id: i64,
    decision: ModerationDecision,
) -> ApiResult<()> {
    match posts_db_operations::apply_moderation(conn, post_id, moderator.id, decision.resulting_status())? {
        ClaimOutcome::Applied => {
            log::info!("Moderator {} set post {} to {}", moderator.id, post_id, decision.resulting_status());
            Ok(())
        }
        ClaimOutcome::ClaimedByOther => Err(ApiError::Forbidden(
            "This post is already being moderated by another moderator.".to_string(),
        )),
        ClaimOutcome::NotFound => Err(ApiError::NotFound(format!("Post not found. There's no post with id={}.", post_id))),
    }
}

/// Likes or dislikes a visible post. Returns `false` when the call withdrew an
/// identical earlier vote.
pub fn vote(conn: &mut Connection, user: &User, post_id: i64, value: VoteValue, now: NaiveDateTime) -> ApiResult<bool> {
    let visible = posts_db_operations::read_post(conn, post_id)?.map_or(false, |p| p.is_visible_at(now));
    if !visible {
        return Err(ApiError::NotFound(format!("Post not found. There's no post with id={}.", post_id)));
    }

    let outcome = votes_db_operations::toggle_vote(conn, post_id, user.id, value, now)?;
    Ok(outcome != VoteOutcome::Removed)
}
