use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::helper::{post_helpers, stats_helpers, utc_now};
use crate::middleware::RequestContext;
use crate::models::db_operations::posts_db_operations::{PostFilter, PostOrder};
use crate::models::db_operations::tags_db_operations;
use crate::models::dto::TagsDto;
use crate::routes::pagination;
use crate::{with_conn, DbPool};
use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Deserialize)]
struct FeedQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    mode: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    query: Option<String>,
}

#[derive(Deserialize)]
struct DateQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct TagQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    tag: Option<String>,
}

#[derive(Deserialize)]
struct TagCloudQuery {
    query: Option<String>,
}

#[derive(Deserialize)]
struct CalendarQuery {
    year: Option<i32>,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/init", web::get().to(get_init))
        .route("/post", web::get().to(get_posts))
        .route("/post/search", web::get().to(search_posts))
        .route("/post/byDate", web::get().to(get_posts_by_date))
        .route("/post/byTag", web::get().to(get_posts_by_tag))
        .route("/post/{id:\\d+}", web::get().to(get_post))
        .route("/tag", web::get().to(get_tags))
        .route("/calendar", web::get().to(get_calendar))
        .route("/statistics/my", web::get().to(get_my_statistics))
        .route("/statistics/all", web::get().to(get_all_statistics))
        .route("/settings", web::get().to(get_settings));
}

async fn get_init(config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok().json(&config.properties)
}

/// Runs a visible-post listing with the given extra filter.
async fn visible_posts_page(
    pool: &web::Data<DbPool>,
    config: &Config,
    offset: Option<i64>,
    limit: Option<i64>,
    order: PostOrder,
    refine: impl FnOnce(PostFilter) -> PostFilter + Send + 'static,
) -> ApiResult<HttpResponse> {
    let page = pagination(offset, limit)?;
    let posts_config = config.posts.clone();
    let result = with_conn(pool, move |conn| {
        let filter = refine(PostFilter::visible(utc_now()));
        post_helpers::fetch_posts_page(conn, &filter, order, page, &posts_config)
    })
    .await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn get_posts(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    query: web::Query<FeedQuery>,
) -> ApiResult<HttpResponse> {
    let mode = query
        .mode
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Wrong request parameters.".to_string()))?;
    let order = PostOrder::parse(mode).ok_or_else(|| {
        ApiError::BadRequest("Wrong mode. Modes allowed: 'recent', 'popular', 'best', 'early'.".to_string())
    })?;
    visible_posts_page(&pool, &config, query.offset, query.limit, order, |filter| filter).await
}

async fn search_posts(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    let text = query
        .query
        .clone()
        .ok_or_else(|| ApiError::BadRequest("Wrong request parameters.".to_string()))?;
    visible_posts_page(&pool, &config, query.offset, query.limit, PostOrder::Recent, move |filter| {
        filter.matching(text.trim())
    })
    .await
}

async fn get_posts_by_date(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    query: web::Query<DateQuery>,
) -> ApiResult<HttpResponse> {
    let date = query
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .ok_or_else(|| ApiError::BadRequest("Wrong request parameters. Expected date=YYYY-MM-DD.".to_string()))?;
    visible_posts_page(&pool, &config, query.offset, query.limit, PostOrder::Recent, move |filter| {
        filter.on_date(date)
    })
    .await
}

async fn get_posts_by_tag(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    query: web::Query<TagQuery>,
) -> ApiResult<HttpResponse> {
    let tag = query
        .tag
        .clone()
        .ok_or_else(|| ApiError::BadRequest("Wrong request parameters.".to_string()))?;
    visible_posts_page(&pool, &config, query.offset, query.limit, PostOrder::Recent, move |filter| {
        filter.tagged(&tag)
    })
    .await
}

async fn get_post(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    post_id: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let post_id = post_id.into_inner();
    let viewer = ctx.user;
    let post = with_conn(&pool, move |conn| {
        post_helpers::fetch_post_for_viewer(conn, post_id, viewer.as_ref(), utc_now())
    })
    .await?;
    Ok(HttpResponse::Ok().json(post))
}

async fn get_tags(pool: web::Data<DbPool>, query: web::Query<TagCloudQuery>) -> ApiResult<HttpResponse> {
    let prefix = query.into_inner().query;
    let tags = with_conn(&pool, move |conn| {
        Ok(tags_db_operations::read_weighted_tags(conn, utc_now(), prefix.as_deref())?)
    })
    .await?;
    Ok(HttpResponse::Ok().json(TagsDto { tags }))
}

async fn get_calendar(pool: web::Data<DbPool>, query: web::Query<CalendarQuery>) -> ApiResult<HttpResponse> {
    let year = query.year;
    let calendar = with_conn(&pool, move |conn| stats_helpers::calendar(conn, utc_now(), year)).await?;
    Ok(HttpResponse::Ok().json(calendar))
}

async fn get_my_statistics(pool: web::Data<DbPool>, ctx: RequestContext) -> ApiResult<HttpResponse> {
    let user_id = ctx.require_user()?.id;
    let stats = with_conn(&pool, move |conn| stats_helpers::statistics(conn, utc_now(), Some(user_id))).await?;
    Ok(HttpResponse::Ok().json(stats))
}

async fn get_all_statistics(pool: web::Data<DbPool>, ctx: RequestContext) -> ApiResult<HttpResponse> {
    if !ctx.settings.statistics_is_public && !ctx.is_moderator() {
        return Err(ApiError::Unauthorized);
    }
    let stats = with_conn(&pool, move |conn| stats_helpers::statistics(conn, utc_now(), None)).await?;
    Ok(HttpResponse::Ok().json(stats))
}

async fn get_settings(ctx: RequestContext) -> HttpResponse {
    HttpResponse::Ok().json(ctx.settings)
}
