use crate::error::{ApiError, ApiResult};
use crate::models::db_operations::{settings_db_operations, users_db_operations};
use crate::models::{GlobalSettings, User};
use crate::{with_conn, DbPool};
use actix_session::{Session, SessionExt};
use actix_web::{dev, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_EMAIL: &str = "email";

/// Per-request view of who is calling and how the blog is configured. Loaded fresh
/// from the database for every request that asks for it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<User>,
    pub settings: GlobalSettings,
}

impl RequestContext {
    pub fn require_user(&self) -> ApiResult<&User> {
        self.user.as_ref().ok_or(ApiError::Unauthorized)
    }

    pub fn require_moderator(&self) -> ApiResult<&User> {
        let user = self.require_user()?;
        if user.is_moderator {
            Ok(user)
        } else {
            Err(ApiError::Forbidden("You're not allowed to moderate posts.".to_string()))
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.user.as_ref().map_or(false, |u| u.is_moderator)
    }
}

impl FromRequest for RequestContext {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        Box::pin(async move {
            let pool = pool.ok_or_else(|| ApiError::Internal("Database pool is not configured.".to_string()))?;
            let user_id = session.get::<i64>(SESSION_USER_ID).unwrap_or(None);

            let (user, settings) = with_conn(&pool, move |conn| {
                let user = match user_id {
                    Some(id) => users_db_operations::read_user_by_id(conn, id)?,
                    None => None,
                };
                Ok((user, settings_db_operations::read_settings(conn)?))
            })
            .await?;

            if user_id.is_some() && user.is_none() {
                log::warn!("Session refers to a deleted user; clearing it.");
                session.purge();
            }
            Ok(RequestContext { user, settings })
        })
    }
}

/// Binds the session cookie to `user`.
pub fn start_session(session: &Session, user: &User) -> ApiResult<()> {
    session.renew();
    session
        .insert(SESSION_USER_ID, user.id)
        .and_then(|_| session.insert(SESSION_EMAIL, &user.email))
        .map_err(|e| ApiError::Internal(format!("Failed to store session: {}", e)))
}

/// Drops the session and returns the e-mail it belonged to, if any.
pub fn end_session(session: &Session) -> Option<String> {
    let email = session.get::<String>(SESSION_EMAIL).unwrap_or(None);
    session.purge();
    email
}
