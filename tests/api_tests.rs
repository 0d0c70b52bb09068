use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use blogapp_backend::config::Config;
use blogapp_backend::helper::utc_now;
use blogapp_backend::models::db_operations::{captcha_db_operations, users_db_operations};
use blogapp_backend::notifications::mail::LogMailer;
use blogapp_backend::notifications::telegram::TelegramNotifier;
use blogapp_backend::setup::db_setup;
use blogapp_backend::{routes, AppState, DbPool};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const PASSWORD: &str = "secret-pass";
const POST_TEXT: &str = "<p>This body is comfortably longer than fifty characters of plain text.</p>";

struct TestContext {
    pool: DbPool,
    config: Config,
    mailer: Arc<LogMailer>,
    upload_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let upload_dir = tempfile::tempdir().expect("upload dir");
        let upload_path = upload_dir.path().to_str().expect("utf-8 path").to_string();
        let mut config = Config::with_paths("/tmp/blog-test-data", &upload_path).expect("config");
        config.password.bcrypt_cost = 4;

        // One in-memory connection shared by every request.
        let manager = SqliteConnectionManager::memory().with_init(db_setup::configure_connection);
        let pool = Pool::builder().max_size(1).build(manager).expect("pool");
        {
            let mut conn = pool.get().expect("connection");
            db_setup::setup_blog_db(&mut conn).expect("schema");
        }

        Self { pool, config, mailer: Arc::new(LogMailer::new()), upload_dir }
    }

    fn add_user(&self, email: &str, moderator: bool) -> i64 {
        let conn = self.pool.get().expect("connection");
        let id = users_db_operations::create_user(&conn, email, "Tester", PASSWORD, 4, utc_now()).expect("user");
        if moderator {
            users_db_operations::set_moderator(&conn, email, true).expect("moderator");
        }
        id
    }

    fn captcha_code(&self, secret: &str) -> String {
        let conn = self.pool.get().expect("connection");
        captcha_db_operations::read_captcha_by_secret(&conn, secret)
            .expect("query")
            .expect("captcha")
            .code
    }
}

macro_rules! test_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.config.clone()))
                .app_data(web::Data::new($ctx.pool.clone()))
                .app_data(web::Data::new(AppState {
                    notifier: TelegramNotifier::new($ctx.config.telegram.clone()).expect("http client"),
                    mailer: $ctx.mailer.clone(),
                }))
                .configure(routes::configure)
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[7u8; 64]))
                        .cookie_secure(false)
                        .build(),
                ),
        )
        .await
    };
}

fn session_cookie<B>(resp: &ServiceResponse<B>) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == "id")
        .map(|c| c.into_owned())
        .expect("session cookie")
}

fn login_request(email: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "e_mail": email, "password": PASSWORD }))
}

fn post_body(title: &str) -> Value {
    json!({
        "time": "2020-01-01T10:00",
        "active": 1,
        "title": title,
        "tags": ["Rust", "web"],
        "text": POST_TEXT,
    })
}

#[actix_web::test]
async fn registration_login_and_logout() {
    let ctx = TestContext::new();
    let app = test_app!(ctx);

    let captcha: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/auth/captcha").to_request()).await;
    let secret = captcha["secret"].as_str().expect("secret").to_string();
    assert!(captcha["image"].as_str().expect("image").starts_with("data:image/svg+xml;base64,"));

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "e_mail": "new@example.com",
            "password": PASSWORD,
            "name": "Newcomer",
            "captcha": ctx.captcha_code(&secret),
            "captcha_secret": secret,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "result": true }));

    let resp = test::call_service(&app, login_request("new@example.com").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["name"], "Newcomer");
    assert!(body["user"].get("moderation").is_none());

    let req = test::TestRequest::get().uri("/api/auth/check").cookie(cookie.clone()).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);
    assert_eq!(body["user"]["email"], "new@example.com");

    let req = test::TestRequest::get().uri("/api/auth/logout").cookie(cookie).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);

    let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/auth/check").to_request()).await;
    assert_eq!(body, json!({ "result": false }));
}

#[actix_web::test]
async fn registration_errors_come_back_with_200() {
    let ctx = TestContext::new();
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "e_mail": "not-an-email",
            "password": "123",
            "name": "N",
            "captcha": "nope",
            "captcha_secret": "missing",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], false);
    assert!(body["errors"]["email"].is_string());
    assert!(body["errors"]["password"].is_string());
    assert!(body["errors"]["captcha"].is_string());
}

#[actix_web::test]
async fn wrong_password_is_rejected() {
    let ctx = TestContext::new();
    ctx.add_user("reader@example.com", false);
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "e_mail": "reader@example.com", "password": "not-the-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["password"].is_string());
}

#[actix_web::test]
async fn anonymous_users_cannot_write() {
    let ctx = TestContext::new();
    let app = test_app!(ctx);

    let req = test::TestRequest::post().uri("/api/post").set_json(post_body("Anonymous")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], false);

    let req = test::TestRequest::get().uri("/api/statistics/my").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn premoderated_post_reaches_the_feed_after_acceptance() {
    let ctx = TestContext::new();
    ctx.add_user("author@example.com", false);
    ctx.add_user("mod@example.com", true);
    let app = test_app!(ctx);

    let author = session_cookie(&test::call_service(&app, login_request("author@example.com").to_request()).await);
    let moderator = session_cookie(&test::call_service(&app, login_request("mod@example.com").to_request()).await);

    let req = test::TestRequest::post()
        .uri("/api/post")
        .cookie(author.clone())
        .set_json(post_body("First post"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);
    let post_id = body["id"].as_i64().expect("post id");

    let feed_uri = "/api/post?offset=0&limit=10&mode=recent";
    let feed: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(feed_uri).to_request()).await;
    assert_eq!(feed["count"], 0);

    let req = test::TestRequest::get()
        .uri("/api/post/my?status=pending&offset=0&limit=10")
        .cookie(author.clone())
        .to_request();
    let mine: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(mine["count"], 1);

    let req = test::TestRequest::get()
        .uri("/api/post/moderation?status=new&offset=0&limit=10")
        .cookie(moderator.clone())
        .to_request();
    let queue: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["posts"][0]["id"], post_id);

    let req = test::TestRequest::post()
        .uri("/api/moderation")
        .cookie(moderator)
        .set_json(json!({ "post_id": post_id, "decision": "accept" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);

    let feed: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(feed_uri).to_request()).await;
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["posts"][0]["title"], "First post");

    let post: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri(&format!("/api/post/{}", post_id)).to_request(),
    )
    .await;
    assert_eq!(post["tags"], json!(["Rust", "web"]));
    assert_eq!(post["viewCount"], 1);

    let tags: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/tag").to_request()).await;
    assert_eq!(tags["tags"][0]["weight"], 1.0);

    let by_tag: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/post/byTag?tag=rust&offset=0&limit=10").to_request(),
    )
    .await;
    assert_eq!(by_tag["count"], 1);
}

#[actix_web::test]
async fn moderators_cannot_take_over_a_claimed_post() {
    let ctx = TestContext::new();
    ctx.add_user("mod1@example.com", true);
    ctx.add_user("mod2@example.com", true);
    ctx.add_user("author@example.com", false);
    let app = test_app!(ctx);

    let author = session_cookie(&test::call_service(&app, login_request("author@example.com").to_request()).await);
    let first = session_cookie(&test::call_service(&app, login_request("mod1@example.com").to_request()).await);
    let second = session_cookie(&test::call_service(&app, login_request("mod2@example.com").to_request()).await);

    let req = test::TestRequest::post().uri("/api/post").cookie(author).set_json(post_body("Claimed")).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let post_id = body["id"].as_i64().expect("post id");

    let decide = |cookie: Cookie<'static>, decision: &str| {
        test::TestRequest::post()
            .uri("/api/moderation")
            .cookie(cookie)
            .set_json(json!({ "post_id": post_id, "decision": decision }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, decide(first.clone(), "decline")).await.status(), StatusCode::OK);
    assert_eq!(test::call_service(&app, decide(second, "accept")).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(test::call_service(&app, decide(first, "accept")).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn votes_toggle_and_comments_thread() {
    let ctx = TestContext::new();
    ctx.add_user("mod@example.com", true);
    ctx.add_user("reader@example.com", false);
    let app = test_app!(ctx);

    let moderator = session_cookie(&test::call_service(&app, login_request("mod@example.com").to_request()).await);
    let reader = session_cookie(&test::call_service(&app, login_request("reader@example.com").to_request()).await);

    // Pre-moderation off: posts are published right away.
    let req = test::TestRequest::put()
        .uri("/api/settings")
        .cookie(moderator.clone())
        .set_json(json!({ "POST_PREMODERATION": false }))
        .to_request();
    let settings: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settings["POST_PREMODERATION"], false);
    assert_eq!(settings["MULTIUSER_MODE"], true);

    let req = test::TestRequest::post().uri("/api/post").cookie(moderator).set_json(post_body("Votable")).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let post_id = body["id"].as_i64().expect("post id");

    let like = || {
        test::TestRequest::post()
            .uri("/api/post/like")
            .cookie(reader.clone())
            .set_json(json!({ "post_id": post_id }))
            .to_request()
    };
    let first: Value = test::call_and_read_body_json(&app, like()).await;
    assert_eq!(first["result"], true);
    let second: Value = test::call_and_read_body_json(&app, like()).await;
    assert_eq!(second["result"], false);

    let req = test::TestRequest::post()
        .uri("/api/post/dislike")
        .cookie(reader.clone())
        .set_json(json!({ "post_id": 9999 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/comment")
        .cookie(reader.clone())
        .set_json(json!({ "post_id": post_id, "text": "Nice post!" }))
        .to_request();
    let root: Value = test::call_and_read_body_json(&app, req).await;
    let root_id = root["id"].as_i64().expect("comment id");

    let req = test::TestRequest::post()
        .uri("/api/comment")
        .cookie(reader.clone())
        .set_json(json!({ "post_id": post_id, "parent_id": root_id, "text": "Replying to myself" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/comment")
        .cookie(reader)
        .set_json(json!({ "post_id": post_id, "text": "<b></b>" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["text"].is_string());

    let post: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri(&format!("/api/post/{}", post_id)).to_request(),
    )
    .await;
    let comments = post["comments"].as_array().expect("comments");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[1]["parentId"], root_id);
    assert_eq!(post["likeCount"], 0);
}

#[actix_web::test]
async fn password_restore_mails_a_working_link() {
    let ctx = TestContext::new();
    ctx.add_user("forgetful@example.com", false);
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/auth/restore")
        .set_json(json!({ "email": "forgetful@example.com" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "forgetful@example.com");
    let link = sent[0].body.lines().find(|l| l.contains("/login/change-password/")).expect("link");
    let code = link.rsplit('/').next().expect("code").to_string();

    let captcha: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/auth/captcha").to_request()).await;
    let secret = captcha["secret"].as_str().expect("secret").to_string();
    let req = test::TestRequest::post()
        .uri("/api/auth/password")
        .set_json(json!({
            "code": code,
            "password": "brand-new-pass",
            "captcha": ctx.captcha_code(&secret),
            "captcha_secret": secret,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], true);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "e_mail": "forgetful@example.com", "password": "brand-new-pass" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn image_upload_lands_under_the_upload_directory() {
    let ctx = TestContext::new();
    ctx.add_user("reader@example.com", false);
    let app = test_app!(ctx);
    let cookie = session_cookie(&test::call_service(&app, login_request("reader@example.com").to_request()).await);

    let multipart = |filename: &str| {
        let body = format!(
            "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\nfake-image-bytes\r\n--XBOUNDARY--\r\n",
            filename
        );
        test::TestRequest::post()
            .uri("/api/image")
            .cookie(cookie.clone())
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY"))
            .set_payload(body)
            .to_request()
    };

    let resp = test::call_service(&app, multipart("my cat.png")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let path = String::from_utf8(test::read_body(resp).await.to_vec()).expect("utf-8");
    assert!(path.starts_with("/upload/"));
    assert!(path.ends_with("/my_cat.png"));
    let on_disk = ctx.upload_dir.path().join(path.trim_start_matches("/upload/"));
    assert_eq!(std::fs::read(on_disk).expect("stored file"), b"fake-image-bytes");

    let resp = test::call_service(&app, multipart("script.exe")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["errors"]["image"].is_string());
}

#[actix_web::test]
async fn profile_update_reports_conflicts_with_200() {
    let ctx = TestContext::new();
    ctx.add_user("reader@example.com", false);
    ctx.add_user("taken@example.com", false);
    let app = test_app!(ctx);
    let cookie = session_cookie(&test::call_service(&app, login_request("reader@example.com").to_request()).await);

    let req = test::TestRequest::post()
        .uri("/api/profile/my")
        .cookie(cookie.clone())
        .set_json(json!({ "name": "Reader", "email": "taken@example.com" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], false);
    assert!(body["errors"]["email"].is_string());

    let req = test::TestRequest::post()
        .uri("/api/profile/my")
        .cookie(cookie.clone())
        .set_json(json!({ "name": "Renamed Reader", "email": "reader@example.com", "removePhoto": 0 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "result": true }));

    let req = test::TestRequest::get().uri("/api/auth/check").cookie(cookie).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["name"], "Renamed Reader");
}

#[actix_web::test]
async fn private_statistics_and_closed_registration() {
    let ctx = TestContext::new();
    ctx.add_user("mod@example.com", true);
    let app = test_app!(ctx);
    let moderator = session_cookie(&test::call_service(&app, login_request("mod@example.com").to_request()).await);

    let stats: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/statistics/all").to_request()).await;
    assert_eq!(stats["postsCount"], 0);

    let req = test::TestRequest::put()
        .uri("/api/settings")
        .cookie(moderator.clone())
        .set_json(json!({ "STATISTICS_IS_PUBLIC": false, "MULTIUSER_MODE": false }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/api/statistics/all").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    let req = test::TestRequest::get().uri("/api/statistics/all").cookie(moderator).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "e_mail": "late@example.com",
            "password": PASSWORD,
            "name": "Late",
            "captcha": "x",
            "captcha_secret": "y",
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn listings_need_pagination_and_a_known_mode() {
    let ctx = TestContext::new();
    let app = test_app!(ctx);

    for uri in [
        "/api/post?mode=recent",
        "/api/post?offset=0&limit=10&mode=sideways",
        "/api/post/byDate?date=yesterday&offset=0&limit=10",
        "/api/post/search?offset=0&limit=10",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/post?offset=-5&limit=0&mode=popular").to_request(),
    )
    .await;
    assert_eq!(body, json!({ "count": 0, "posts": [] }));

    let init: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/init").to_request()).await;
    assert_eq!(init["title"], "BlogApp");

    let calendar: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/calendar").to_request()).await;
    assert_eq!(calendar["years"], json!([]));
}
