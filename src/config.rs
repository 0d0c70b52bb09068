use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Built-in defaults. An optional `config/local.toml` next to the working directory
/// may override any of them before the `.env` values are applied.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Public blog properties returned by `GET /api/init`.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct BlogProperties {
    pub title: String,
    pub subtitle: String,
    pub phone: String,
    pub email: String,
    pub copyright: String,
    pub copyright_from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptchaConfig {
    pub length: usize,
    pub ttl_hours: i64,
    pub font_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PasswordConfig {
    pub min: usize,
    pub max: usize,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostsConfig {
    pub title_min: usize,
    pub title_max: usize,
    pub text_min: usize,
    pub announce_length: usize,
    pub comment_min: usize,
    pub name_max: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_file_size_mb: u64,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub proxy_url: String,
    pub proxy_token: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub upload_path: String,
    pub frontend_path: Option<String>,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub public_url: String,
    pub properties: BlogProperties,
    pub captcha: CaptchaConfig,
    pub password: PasswordConfig,
    pub posts: PostsConfig,
    pub upload: UploadConfig,
    pub telegram: TelegramConfig,
    pub mail: MailConfig,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

fn require_absolute(name: &str, value: &str) -> Result<(), config::ConfigError> {
    if Path::new(value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(())
}

fn flag_var(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v.trim().parse::<bool>().unwrap_or(false))
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        let upload_path = required_var("UPLOAD_PATH")?;
        require_absolute("DATABASE_PATH", &database_path)?;
        require_absolute("UPLOAD_PATH", &upload_path)?;

        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
            ));
        }

        let mut overrides: Vec<(&str, config::Value)> = vec![
            ("database_path", database_path.into()),
            ("upload_path", upload_path.into()),
            ("session_secret_key", session_secret_key.into()),
            ("allowed_origins", env::var("ALLOWED_ORIGINS").unwrap_or_default().into()),
            ("log_level", env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()).into()),
            ("use_secure_cookies", flag_var("USE_SECURE_COOKIES").unwrap_or(false).into()),
        ];

        if let Ok(public_url) = env::var("PUBLIC_URL") {
            overrides.push(("public_url", public_url.into()));
        }
        if let Ok(frontend_path) = env::var("FRONTEND_PATH") {
            require_absolute("FRONTEND_PATH", &frontend_path)?;
            overrides.push(("frontend_path", frontend_path.into()));
        }

        // Integration credentials
        if let Some(enabled) = flag_var("TELEGRAM_ENABLED") {
            overrides.push(("telegram.enabled", enabled.into()));
        }
        for (var, key) in [
            ("TELEGRAM_PROXY_URL", "telegram.proxy_url"),
            ("TELEGRAM_PROXY_TOKEN", "telegram.proxy_token"),
            ("SMTP_HOST", "mail.smtp_host"),
            ("SMTP_USERNAME", "mail.username"),
            ("SMTP_PASSWORD", "mail.password"),
            ("MAIL_FROM", "mail.from"),
        ] {
            if let Ok(value) = env::var(var) {
                overrides.push((key, value.into()));
            }
        }
        if let Some(port) = env::var("SMTP_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            overrides.push(("mail.smtp_port", i64::from(port).into()));
        }

        Self::build(overrides)
    }

    /// Builds a configuration from the built-in defaults with explicit storage paths,
    /// without reading any `.env` file.
    pub fn with_paths(database_path: &str, upload_path: &str) -> Result<Self, config::ConfigError> {
        Self::build(vec![
            ("database_path", database_path.into()),
            ("upload_path", upload_path.into()),
            ("session_secret_key", "0".repeat(128).into()),
            ("allowed_origins", "".into()),
            ("log_level", "info".into()),
            ("use_secure_cookies", false.into()),
        ])
    }

    fn build(overrides: Vec<(&str, config::Value)>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("config/local").required(false));

        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        let mut config: Config = builder.build()?.try_deserialize()?;
        if config.public_url.is_empty() {
            config.public_url = format!("http://{}:{}", config.web.host, config.web.port);
        }
        Ok(config)
    }

    /// Returns the full path to the blog database file inside its own folder.
    pub fn blog_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("blog").join("blog.db")
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.upload.max_file_size_mb * 1024 * 1024
    }
}
