use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::dev::{fn_service, ServiceRequest, ServiceResponse};
use actix_web::{
    cookie::Key,
    http::header,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use blogapp_backend::{
    config::Config,
    helper::media_helpers::UPLOAD_URL_PREFIX,
    notifications::mail::{LogMailer, Mailer, SmtpMailer},
    notifications::telegram::TelegramNotifier,
    routes,
    setup::db_setup,
    AppState,
};
use clap::Parser;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Answers `/` when no frontend directory is configured.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "blog_server", author, version, about = "Starts the blog API server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn fatal<E: Display>(context: &'static str) -> impl FnOnce(E) -> io::Error {
    move |e| {
        log::error!("FATAL: {}: {}", context, e);
        io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
    }
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let db_path = config.blog_db_path();
    if !db_path.exists() {
        log::error!(
            "FATAL: blog.db not found at '{}'. Run 'blog_setup --env-file <path> db setup' first.",
            db_path.display()
        );
        std::process::exit(1);
    }
    fs::create_dir_all(&config.upload_path).map_err(fatal("Failed to create upload directory"))?;

    let manager = SqliteConnectionManager::file(&db_path).with_init(db_setup::configure_connection);
    let pool = Pool::builder()
        .build(manager)
        .map_err(fatal("Failed to create SQLite connection pool"))?;

    let notifier = TelegramNotifier::new(config.telegram.clone()).map_err(fatal("Failed to build HTTP client"))?;
    let mailer: Arc<dyn Mailer> = if config.mail.smtp_host.is_empty() {
        log::warn!("SMTP_HOST is not set; outgoing mail is only written to the log.");
        Arc::new(LogMailer::new())
    } else {
        Arc::new(SmtpMailer::new(&config.mail).map_err(fatal("Failed to configure SMTP transport"))?)
    };
    let app_state = web::Data::new(AppState { notifier, mailer });

    let session_key_bytes =
        hex::decode(&config.session_secret_key).map_err(fatal("SESSION_SECRET_KEY is not a valid hex string"))?;
    let session_key =
        Key::try_from(session_key_bytes.as_slice()).map_err(fatal("SESSION_SECRET_KEY is too short"))?;

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("🚀 Server starting at http://{}", server_address);

    let config_data = web::Data::new(config.clone());
    let pool_data = web::Data::new(pool);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let app = App::new()
            .app_data(config_data.clone())
            .app_data(pool_data.clone())
            .app_data(app_state.clone())
            .configure(routes::configure)
            .service(Files::new(UPLOAD_URL_PREFIX, &config.upload_path));

        // The frontend is a single page app: unknown paths get its index.html.
        let app = match &config.frontend_path {
            Some(frontend) => {
                let index = PathBuf::from(frontend).join("index.html");
                app.service(Files::new("/", frontend).index_file("index.html").default_handler(fn_service(
                    move |req: ServiceRequest| {
                        let index = index.clone();
                        async move {
                            let (req, _) = req.into_parts();
                            let file = NamedFile::open_async(index).await?;
                            let res = file.into_response(&req);
                            Ok(ServiceResponse::new(req, res))
                        }
                    },
                )))
            }
            None => app.route("/", web::get().to(root_handler)),
        };

        app.wrap(session_mw)
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
