use crate::error::{ApiError, ApiResult, ResultResponse};
use crate::helper::post_helpers::Pagination;
use actix_web::{web, HttpResponse};

pub mod auth;
pub mod moderation;
pub mod public;
pub mod user;

/// Registers every `/api` route plus JSON/query error handlers that answer in the
/// `{result, message}` envelope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _| ApiError::BadRequest(format!("Bad request: {}", err)).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(format!("Wrong request parameters: {}", err)).into()),
    )
    .service(
        web::scope("/api")
            .configure(auth::config_api)
            .configure(moderation::config_api)
            .configure(user::config_api)
            .configure(public::config_api),
    );
}

/// `offset` and `limit` are mandatory on every listing.
pub(crate) fn pagination(offset: Option<i64>, limit: Option<i64>) -> ApiResult<Pagination> {
    match (offset, limit) {
        (Some(offset), Some(limit)) => Ok(Pagination::new(offset, limit)),
        _ => Err(ApiError::BadRequest("Wrong request parameters.".to_string())),
    }
}

/// Some forms report validation problems with 200 and `{result: false, errors}`.
pub(crate) fn soft_validation<T>(result: ApiResult<T>, on_success: impl FnOnce(T) -> HttpResponse) -> ApiResult<HttpResponse> {
    match result {
        Ok(value) => Ok(on_success(value)),
        Err(ApiError::Validation(errors)) => Ok(HttpResponse::Ok().json(ResultResponse::failed().with_errors(errors))),
        Err(e) => Err(e),
    }
}
