use crate::config::Config;
use crate::error::{ApiError, ApiResult, ResultResponse, ValidationErrors};
use crate::helper::comment_helpers::{self, CommentRequest};
use crate::helper::media_helpers::{self, MultipartForm};
use crate::helper::post_helpers::{self, PostRequest, SavedPost};
use crate::helper::profile_helpers::{self, ProfileJsonRequest, ProfileUpdate};
use crate::helper::utc_now;
use crate::middleware::RequestContext;
use crate::models::db_operations::posts_db_operations::{MyPostsStatus, PostFilter, PostOrder};
use crate::models::dto::CommentCreatedDto;
use crate::models::{User, VoteValue};
use crate::routes::{pagination, soft_validation};
use crate::{with_conn, AppState, DbPool};
use actix_multipart::Multipart;
use actix_web::guard::{self, GuardContext};
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct MyPostsQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct VoteRequest {
    post_id: i64,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/post/my", web::get().to(get_my_posts))
        .route("/post", web::post().to(create_post))
        .route("/post/{id:\\d+}", web::put().to(edit_post))
        .route("/post/like", web::post().to(like_post))
        .route("/post/dislike", web::post().to(dislike_post))
        .route("/comment", web::post().to(add_comment))
        .route(
            "/profile/my",
            web::post().guard(guard::fn_guard(is_multipart)).to(update_profile_multipart),
        )
        .route("/profile/my", web::post().to(update_profile_json))
        .route("/image", web::post().to(upload_image));
}

fn is_multipart(ctx: &GuardContext) -> bool {
    ctx.head()
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("multipart/form-data"))
}

async fn get_my_posts(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    query: web::Query<MyPostsQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = ctx.require_user()?.id;
    let page = pagination(query.offset, query.limit)?;
    let status = query
        .status
        .as_deref()
        .and_then(MyPostsStatus::parse)
        .ok_or_else(|| {
            ApiError::BadRequest("Wrong status. Allowed: 'inactive', 'pending', 'declined', 'published'.".to_string())
        })?;

    let posts_config = config.posts.clone();
    let result = with_conn(&pool, move |conn| {
        let filter = PostFilter::authored_by(user_id, status);
        post_helpers::fetch_posts_page(conn, &filter, PostOrder::Recent, page, &posts_config)
    })
    .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Telegram alert for saves that landed in the moderation queue.
fn announce_saved_post(app_state: &AppState, config: &Config, author: &User, saved: &SavedPost) {
    if saved.awaits_moderation() {
        app_state
            .notifier
            .notify_post_awaiting_moderation(&author.email, &saved.title, saved.id, &config.public_url);
    }
}

async fn create_post(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    app_state: web::Data<AppState>,
    ctx: RequestContext,
    form: web::Json<PostRequest>,
) -> ApiResult<HttpResponse> {
    let author = ctx.require_user()?.clone();
    let settings = ctx.settings;
    let posts_config = config.posts.clone();
    let request = form.into_inner();

    let (author, saved) = with_conn(&pool, move |conn| {
        let saved = post_helpers::create_post(conn, &author, &settings, &posts_config, &request, utc_now())?;
        Ok((author, saved))
    })
    .await?;

    announce_saved_post(&app_state, &config, &author, &saved);
    Ok(HttpResponse::Ok().json(json!({ "result": true, "id": saved.id })))
}

async fn edit_post(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    app_state: web::Data<AppState>,
    ctx: RequestContext,
    post_id: web::Path<i64>,
    form: web::Json<PostRequest>,
) -> ApiResult<HttpResponse> {
    let editor = ctx.require_user()?.clone();
    let settings = ctx.settings;
    let posts_config = config.posts.clone();
    let post_id = post_id.into_inner();
    let request = form.into_inner();

    let (editor, saved) = with_conn(&pool, move |conn| {
        let saved = post_helpers::edit_post(conn, &editor, post_id, &settings, &posts_config, &request, utc_now())?;
        Ok((editor, saved))
    })
    .await?;

    announce_saved_post(&app_state, &config, &editor, &saved);
    Ok(HttpResponse::Ok().json(json!({ "result": true, "id": saved.id })))
}

async fn cast_vote(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    request: VoteRequest,
    value: VoteValue,
) -> ApiResult<HttpResponse> {
    let user = ctx.require_user()?.clone();
    let counted = with_conn(&pool, move |conn| {
        post_helpers::vote(conn, &user, request.post_id, value, utc_now())
    })
    .await?;
    Ok(HttpResponse::Ok().json(if counted { ResultResponse::ok() } else { ResultResponse::failed() }))
}

async fn like_post(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    form: web::Json<VoteRequest>,
) -> ApiResult<HttpResponse> {
    cast_vote(pool, ctx, form.into_inner(), VoteValue::Like).await
}

async fn dislike_post(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    form: web::Json<VoteRequest>,
) -> ApiResult<HttpResponse> {
    cast_vote(pool, ctx, form.into_inner(), VoteValue::Dislike).await
}

async fn add_comment(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    form: web::Json<CommentRequest>,
) -> ApiResult<HttpResponse> {
    let user = ctx.require_user()?.clone();
    let posts_config = config.posts.clone();
    let request = form.into_inner();
    let id = with_conn(&pool, move |conn| {
        comment_helpers::add_comment(conn, &user, &posts_config, &request, utc_now())
    })
    .await?;
    Ok(HttpResponse::Ok().json(CommentCreatedDto { id }))
}

async fn apply_profile_update(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    user: User,
    update: ProfileUpdate,
) -> ApiResult<HttpResponse> {
    let result = profile_helpers::update_profile(&pool, &config, user, update).await;
    soft_validation(result, |_| HttpResponse::Ok().json(ResultResponse::ok()))
}

async fn update_profile_multipart(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let user = ctx.require_user()?.clone();
    let form = media_helpers::read_multipart(payload, config.max_upload_bytes()).await?;
    let update = ProfileUpdate::from_form(form)?;
    apply_profile_update(pool, config, user, update).await
}

async fn update_profile_json(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    form: web::Json<ProfileJsonRequest>,
) -> ApiResult<HttpResponse> {
    let user = ctx.require_user()?.clone();
    apply_profile_update(pool, config, user, ProfileUpdate::from(form.into_inner())).await
}

async fn upload_image(
    config: web::Data<Config>,
    ctx: RequestContext,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let user_id = ctx.require_user()?.id;
    let MultipartForm { mut files, .. } = media_helpers::read_multipart(payload, config.max_upload_bytes()).await?;

    let mut errors = ValidationErrors::new();
    let Some(image) = files.remove("image").filter(|f| !f.filename.is_empty()) else {
        errors.add("image", "No file was uploaded.");
        return Err(ApiError::Validation(errors));
    };
    if !media_helpers::is_allowed_image(&image.filename, &config.upload) {
        errors.add(
            "image",
            format!("Wrong file format. Allowed: {}.", config.upload.allowed_extensions.join(", ")),
        );
        return Err(ApiError::Validation(errors));
    }

    let path = media_helpers::store_upload(&config.upload_path, image).await?;
    log::info!("User {} uploaded '{}'", user_id, path);
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(path))
}
