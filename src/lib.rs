use std::sync::Arc;

use actix_web::web;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::ApiResult;
use crate::notifications::mail::Mailer;
use crate::notifications::telegram::TelegramNotifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Outbound collaborators shared by every worker.
pub struct AppState {
    pub notifier: TelegramNotifier,
    pub mailer: Arc<dyn Mailer>,
}

/// Runs `f` with a pooled connection on the blocking thread pool.
pub async fn with_conn<F, T>(pool: &web::Data<DbPool>, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut Connection) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

pub mod config;
pub mod error;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod setup;
