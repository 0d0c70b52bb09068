use crate::models::db_operations::DbError;
use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name → human readable message. The first message recorded for a field wins.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok(())` when nothing was recorded, otherwise a 400 validation error.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// The `{result, message?, errors?}` envelope used by every write endpoint.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "ValidationErrors::is_empty")]
    pub errors: ValidationErrors,
}

impl ResultResponse {
    pub fn ok() -> Self {
        Self { result: true, message: None, errors: ValidationErrors::new() }
    }

    pub fn failed() -> Self {
        Self { result: false, message: None, errors: ValidationErrors::new() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_errors(mut self, errors: ValidationErrors) -> Self {
        self.errors = errors;
        self
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Request validation failed.")]
    Validation(ValidationErrors),
    #[error("Authorization required.")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Database(DbError::Rusqlite(e))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Database(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Pool(_) | ApiError::Blocking(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            ApiError::Validation(errors) => ResultResponse::failed().with_errors(errors.clone()),
            _ if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE => {
                log::error!("Request failed: {}", self);
                ResultResponse::failed().with_message("Internal server error.")
            }
            ApiError::Unavailable(reason) => {
                log::warn!("Downstream service unavailable: {}", reason);
                ResultResponse::failed().with_message(reason.clone())
            }
            _ => ResultResponse::failed().with_message(self.to_string()),
        };
        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_for_a_field_is_kept() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "Wrong format.");
        errors.add("email", "Already registered.");
        assert_eq!(errors.get("email"), Some("Wrong format."));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn empty_errors_are_not_serialized() {
        let json = serde_json::to_value(ResultResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "result": true }));
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("no".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Database(DbError::NotFound("post 1".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Validation(ValidationErrors::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unavailable("smtp".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
