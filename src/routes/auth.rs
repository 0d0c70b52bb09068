use crate::config::Config;
use crate::error::{ApiError, ApiResult, ResultResponse};
use crate::helper::auth_helpers::{self, LoginRequest, PasswordChangeRequest, RegistrationRequest, RestoreRequest};
use crate::helper::{captcha_helpers, utc_now};
use crate::middleware::{end_session, start_session, RequestContext};
use crate::models::db_operations::users_db_operations;
use crate::models::dto::AuthResponse;
use crate::routes::soft_validation;
use crate::{with_conn, AppState, DbPool};
use actix_session::Session;
use actix_web::{web, HttpResponse};

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/check", web::get().to(check))
            .route("/logout", web::get().to(logout))
            .route("/register", web::post().to(register))
            .route("/captcha", web::get().to(get_captcha))
            .route("/restore", web::post().to(restore))
            .route("/password", web::post().to(change_password)),
    );
}

async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    session: Session,
    form: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let config = config.get_ref().clone();
    let request = form.into_inner();
    let (user, dto) = with_conn(&pool, move |conn| {
        let user = auth_helpers::login(conn, &config, &request)?;
        let dto = auth_helpers::user_dto(conn, &user)?;
        Ok((user, dto))
    })
    .await?;

    start_session(&session, &user)?;
    log::info!("User '{}' logged in", user.email);
    Ok(HttpResponse::Ok().json(AuthResponse { result: true, user: dto }))
}

async fn check(pool: web::Data<DbPool>, ctx: RequestContext) -> ApiResult<HttpResponse> {
    let Some(user) = ctx.user else {
        return Ok(HttpResponse::Ok().json(ResultResponse::failed()));
    };
    let dto = with_conn(&pool, move |conn| Ok(auth_helpers::user_dto(conn, &user)?)).await?;
    Ok(HttpResponse::Ok().json(AuthResponse { result: true, user: dto }))
}

async fn logout(session: Session) -> HttpResponse {
    match end_session(&session) {
        Some(email) => {
            log::info!("User '{}' logged out", email);
            HttpResponse::Ok().json(ResultResponse::ok().with_message(format!("User {} is logged out.", email)))
        }
        None => HttpResponse::Ok().json(ResultResponse::ok()),
    }
}

async fn register(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    ctx: RequestContext,
    form: web::Json<RegistrationRequest>,
) -> ApiResult<HttpResponse> {
    if !ctx.settings.multiuser_mode {
        return Err(ApiError::NotFound("Registration is closed.".to_string()));
    }
    let config = config.get_ref().clone();
    let request = form.into_inner();
    let result = with_conn(&pool, move |conn| auth_helpers::register(conn, &config, &request, utc_now())).await;
    soft_validation(result, |_| HttpResponse::Ok().json(ResultResponse::ok()))
}

async fn get_captcha(pool: web::Data<DbPool>, config: web::Data<Config>) -> ApiResult<HttpResponse> {
    let captcha_config = config.captcha.clone();
    let captcha = with_conn(&pool, move |conn| {
        Ok(captcha_helpers::issue_captcha(conn, &captcha_config, utc_now())?)
    })
    .await?;
    Ok(HttpResponse::Ok().json(captcha))
}

/// Mails a restore link. The code is only stored once the mail went out.
async fn restore(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    app_state: web::Data<AppState>,
    form: web::Json<RestoreRequest>,
) -> ApiResult<HttpResponse> {
    let request = form.into_inner();
    let (user, code) = with_conn(&pool, move |conn| auth_helpers::prepare_restore(conn, &request)).await?;

    let link = auth_helpers::restore_link(&config.public_url, &code);
    let body = format!(
        "Hello, {}!\n\nTo set a new password for {} follow this link:\n{}\n\nIf you did not ask for it, ignore this message.",
        user.name, config.properties.title, link
    );
    let subject = format!("{}: password restore", config.properties.title);
    let mailer = app_state.mailer.clone();
    let to = user.email.clone();
    web::block(move || mailer.send(&to, &subject, &body))
        .await?
        .map_err(|e| {
            log::error!("Restore mail to '{}' failed: {}", user.email, e);
            ApiError::Unavailable("Could not send the restore e-mail. Try again later.".to_string())
        })?;

    let user_id = user.id;
    with_conn(&pool, move |conn| Ok(users_db_operations::set_restore_code(conn, user_id, &code)?)).await?;
    log::info!("Password restore link sent to '{}'", user.email);
    Ok(HttpResponse::Ok().json(ResultResponse::ok().with_message(format!("A restore link was sent to {}.", user.email))))
}

async fn change_password(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: web::Json<PasswordChangeRequest>,
) -> ApiResult<HttpResponse> {
    let config = config.get_ref().clone();
    let request = form.into_inner();
    let email = with_conn(&pool, move |conn| auth_helpers::change_password(conn, &config, &request, utc_now())).await?;
    log::info!("Password of '{}' changed via restore link", email);
    Ok(HttpResponse::Ok().json(ResultResponse::ok()))
}
