use crate::helper::sanitization_helpers::plain_text;
use crate::models::setting_codes;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Result as RusqliteResult, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Per-connection pragmas and SQL functions. Applied by the pool to every new connection.
pub fn configure_connection(conn: &mut Connection) -> RusqliteResult<()> {
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    // search_text(x): plain text of x, lowercased. SQLite's lower() only folds ASCII.
    conn.create_scalar_function(
        "search_text",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value = ctx.get::<Option<String>>(0)?;
            Ok(value.map(|v| plain_text(&v).to_lowercase()))
        },
    )
}

/// Creates every table and index if missing and seeds the global settings.
/// Safe to run against an existing database.
pub fn setup_blog_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;

    log::info!("Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            is_moderator INTEGER NOT NULL DEFAULT 0,
            photo TEXT,
            code TEXT,
            reg_time TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'posts' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            moderator_id INTEGER,
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            time TEXT NOT NULL,
            moderation_status TEXT NOT NULL CHECK(moderation_status IN ('NEW', 'ACCEPTED', 'DECLINED')),
            view_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (moderator_id) REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_posts_visibility ON posts (is_active, moderation_status, time)", [])?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_posts_user ON posts (user_id)", [])?;

    log::info!("Creating 'tags' and 'posts_tags' tables...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS posts_tags (
            post_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (post_id, tag_id),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )",
        [],
    )?;

    log::info!("Creating 'comments' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            parent_id INTEGER,
            text TEXT NOT NULL,
            time TEXT NOT NULL,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments (post_id)", [])?;

    log::info!("Creating 'votes' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            value INTEGER NOT NULL CHECK(value IN (-1, 1)),
            time TEXT NOT NULL,
            UNIQUE (post_id, user_id),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    log::info!("Creating 'captcha_codes' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS captcha_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            secret_code TEXT NOT NULL UNIQUE,
            time TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("Creating 'global_settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS global_settings (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            value TEXT NOT NULL CHECK(value IN ('YES', 'NO'))
        )",
        [],
    )?;

    seed_initial_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

fn seed_initial_settings(tx: &Transaction) -> RusqliteResult<()> {
    let defaults = [
        (setting_codes::MULTIUSER_MODE, "Multi-user mode", "YES"),
        (setting_codes::POST_PREMODERATION, "Post pre-moderation", "YES"),
        (setting_codes::STATISTICS_IS_PUBLIC, "Public blog statistics", "YES"),
    ];
    for (code, name, value) in defaults {
        tx.execute(
            "INSERT OR IGNORE INTO global_settings (code, name, value) VALUES (?1, ?2, ?3)",
            [code, name, value],
        )?;
    }
    Ok(())
}
