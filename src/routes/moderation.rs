use crate::config::Config;
use crate::error::{ApiError, ApiResult, ResultResponse};
use crate::helper::post_helpers;
use crate::middleware::RequestContext;
use crate::models::db_operations::posts_db_operations::{ModerationListStatus, PostFilter};
use crate::models::db_operations::settings_db_operations;
use crate::models::{GlobalSettings, ModerationDecision};
use crate::routes::pagination;
use crate::{with_conn, DbPool};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
struct ModerationQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ModerationRequest {
    post_id: i64,
    decision: ModerationDecision,
}

/// Absent flags keep their stored value.
#[derive(Deserialize)]
struct SettingsRequest {
    #[serde(rename = "MULTIUSER_MODE")]
    multiuser_mode: Option<bool>,
    #[serde(rename = "POST_PREMODERATION")]
    post_premoderation: Option<bool>,
    #[serde(rename = "STATISTICS_IS_PUBLIC")]
    statistics_is_public: Option<bool>,
}

impl SettingsRequest {
    fn apply_to(&self, current: GlobalSettings) -> GlobalSettings {
        GlobalSettings {
            multiuser_mode: self.multiuser_mode.unwrap_or(current.multiuser_mode),
            post_premoderation: self.post_premoderation.unwrap_or(current.post_premoderation),
            statistics_is_public: self.statistics_is_public.unwrap_or(current.statistics_is_public),
        }
    }
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/post/moderation", web::get().to(get_moderation_posts))
        .route("/moderation", web::post().to(moderate))
        .route("/settings", web::put().to(update_settings));
}

async fn get_moderation_posts(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    query: web::Query<ModerationQuery>,
) -> ApiResult<HttpResponse> {
    let moderator_id = ctx.require_moderator()?.id;
    let page = pagination(query.offset, query.limit)?;
    let status = query
        .status
        .as_deref()
        .and_then(ModerationListStatus::parse)
        .ok_or_else(|| ApiError::BadRequest("Wrong status. Allowed: 'new', 'declined', 'accepted'.".to_string()))?;

    let posts_config = config.posts.clone();
    let result = with_conn(&pool, move |conn| {
        let filter = PostFilter::moderation_queue(moderator_id, status);
        post_helpers::fetch_moderation_page(conn, &filter, page, &posts_config)
    })
    .await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn moderate(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    form: web::Json<ModerationRequest>,
) -> ApiResult<HttpResponse> {
    let moderator = ctx.require_moderator()?.clone();
    let ModerationRequest { post_id, decision } = form.into_inner();
    with_conn(&pool, move |conn| post_helpers::moderate_post(conn, &moderator, post_id, decision)).await?;
    Ok(HttpResponse::Ok().json(ResultResponse::ok()))
}

async fn update_settings(
    pool: web::Data<DbPool>,
    ctx: RequestContext,
    form: web::Json<SettingsRequest>,
) -> ApiResult<HttpResponse> {
    let moderator_id = ctx.require_moderator()?.id;
    let settings = form.apply_to(ctx.settings);
    with_conn(&pool, move |conn| Ok(settings_db_operations::update_settings(conn, &settings)?)).await?;
    log::info!("Moderator {} changed global settings to {:?}", moderator_id, settings);
    Ok(HttpResponse::Ok().json(settings))
}
