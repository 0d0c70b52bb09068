use crate::config::Config;
use crate::error::{ApiError, ApiResult, ValidationErrors};
use crate::helper::captcha_helpers;
use crate::helper::validators::{validate_email_format, validate_name, validate_password};
use crate::models::db_operations::{captcha_db_operations, posts_db_operations, users_db_operations, DbError};
use crate::models::dto::AuthUserDto;
use crate::models::User;
use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub e_mail: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub e_mail: String,
    pub password: String,
    pub name: String,
    pub captcha: String,
    pub captcha_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub code: String,
    pub password: String,
    pub captcha: String,
    pub captcha_secret: String,
}

/// The `user` object of login/check responses. Moderators also get the size of the
/// moderation queue.
pub fn user_dto(conn: &Connection, user: &User) -> Result<AuthUserDto, DbError> {
    let mut dto = AuthUserDto {
        id: user.id,
        name: user.name.clone(),
        photo: user.photo.clone(),
        email: user.email.clone(),
        moderation: None,
        moderation_count: None,
        settings: None,
    };

    if user.is_moderator {
        dto.moderation = Some(true);
        dto.settings = Some(true);
        dto.moderation_count = Some(posts_db_operations::count_awaiting_moderation(conn)?);
    }
    Ok(dto)
}

pub fn login(conn: &Connection, config: &Config, request: &LoginRequest) -> ApiResult<User> {
    let mut errors = ValidationErrors::new();
    let email = request.e_mail.trim();

    if validate_email_format(email, "email", &mut errors) && !users_db_operations::email_is_registered(conn, email)? {
        errors.add("email", "No user is registered with this e-mail.");
    }
    validate_password(&request.password, &config.password, &mut errors);
    errors.into_result()?;

    match users_db_operations::verify_credentials(conn, email, &request.password)? {
        Some(user) => Ok(user),
        None => {
            let mut errors = ValidationErrors::new();
            errors.add("password", "Either username or password are incorrect.");
            Err(ApiError::Validation(errors))
        }
    }
}

/// Creates the account and consumes the captcha in one write transaction, so a
/// captcha admits a single registration. Returns the new user id.
pub fn register(conn: &mut Connection, config: &Config, request: &RegistrationRequest, now: NaiveDateTime) -> ApiResult<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let conn = &*tx;
    let mut errors = ValidationErrors::new();
    let email = request.e_mail.trim();

    if validate_email_format(email, "email", &mut errors) && users_db_operations::email_is_registered(conn, email)? {
        errors.add("email", "A user with this e-mail is already registered.");
    }
    validate_name(&request.name, &config.posts, &mut errors);
    validate_password(&request.password, &config.password, &mut errors);
    captcha_helpers::validate_captcha(conn, &request.captcha, &request.captcha_secret, &config.captcha, now, &mut errors)?;
    errors.into_result()?;

    let user_id = users_db_operations::create_user(
        conn,
        email,
        request.name.trim(),
        &request.password,
        config.password.bcrypt_cost,
        now,
    )?;
    captcha_db_operations::delete_by_secret(conn, &request.captcha_secret)?;
    tx.commit()?;

    log::info!("Registered user '{}' with id {}", email, user_id);
    Ok(user_id)
}

/// Looks up the account to restore and returns it with a fresh restore code.
/// The code is not stored until the mail is out.
pub fn prepare_restore(conn: &Connection, request: &RestoreRequest) -> ApiResult<(User, String)> {
    let mut errors = ValidationErrors::new();
    let email = request.email.trim();

    if !validate_email_format(email, "email", &mut errors) {
        return Err(ApiError::Validation(errors));
    }
    match users_db_operations::read_user_by_email(conn, email)? {
        Some(user) => Ok((user, Uuid::new_v4().to_string())),
        None => {
            errors.add("email", format!("User with email '{}' is not registered.", email));
            Err(ApiError::Validation(errors))
        }
    }
}

pub fn restore_link(public_url: &str, code: &str) -> String {
    format!("{}/login/change-password/{}", public_url.trim_end_matches('/'), code)
}

/// Exchanges a restore code plus captcha for a new password. Returns the account e-mail.
pub fn change_password(
    conn: &mut Connection,
    config: &Config,
    request: &PasswordChangeRequest,
    now: NaiveDateTime,
) -> ApiResult<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let conn = &*tx;
    let mut errors = ValidationErrors::new();

    let user = if request.code.trim().is_empty() {
        None
    } else {
        users_db_operations::read_user_by_code(conn, request.code.trim())?
    };
    if user.is_none() {
        errors.add(
            "code",
            "The password restore link is outdated. <a href=\"/login/restore-password\">Request a new link</a>.",
        );
    }
    validate_password(&request.password, &config.password, &mut errors);
    captcha_helpers::validate_captcha(conn, &request.captcha, &request.captcha_secret, &config.captcha, now, &mut errors)?;
    errors.into_result()?;

    let user = user.ok_or_else(|| ApiError::Internal("restore code vanished during validation".to_string()))?;
    users_db_operations::reset_password(conn, user.id, &request.password, config.password.bcrypt_cost)?;
    captcha_db_operations::delete_by_secret(conn, &request.captcha_secret)?;
    tx.commit()?;
    Ok(user.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::{add_user, now, open_db};

    fn config() -> Config {
        let mut config = Config::with_paths("/tmp/data", "/tmp/upload").unwrap();
        config.password.bcrypt_cost = 4;
        config
    }

    fn captcha(conn: &Connection, config: &Config) -> (String, String) {
        let dto = captcha_helpers::issue_captcha(conn, &config.captcha, now()).unwrap();
        let code = captcha_db_operations::read_captcha_by_secret(conn, &dto.secret).unwrap().unwrap().code;
        (code, dto.secret)
    }

    #[test]
    fn login_reports_wrong_password_on_password_field() {
        let conn = open_db();
        add_user(&conn, "reader@example.com", false);
        let request = LoginRequest { e_mail: "reader@example.com".into(), password: "bad-password".into() };

        match login(&conn, &config(), &request) {
            Err(ApiError::Validation(errors)) => assert!(errors.contains("password")),
            other => panic!("unexpected result: {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn registration_consumes_the_captcha() {
        let mut conn = open_db();
        let config = config();
        let (code, secret) = captcha(&conn, &config);
        let request = RegistrationRequest {
            e_mail: "new@example.com".into(),
            password: "long-enough".into(),
            name: "Newcomer".into(),
            captcha: code,
            captcha_secret: secret.clone(),
        };

        let id = register(&mut conn, &config, &request, now()).unwrap();
        assert!(users_db_operations::read_user_by_id(&conn, id).unwrap().is_some());
        assert!(captcha_db_operations::read_captcha_by_secret(&conn, &secret).unwrap().is_none());

        match register(&mut conn, &config, &request, now()) {
            Err(ApiError::Validation(errors)) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("captcha"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn concurrent_registrations_share_one_captcha_use() {
        use crate::setup::db_setup;
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.db");
        let open = |path: &std::path::Path| {
            let mut conn = Connection::open(path).unwrap();
            db_setup::configure_connection(&mut conn).unwrap();
            conn
        };
        let mut conn = open(&path);
        db_setup::setup_blog_db(&mut conn).unwrap();
        let config = config();
        let (code, secret) = captcha(&conn, &config);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["first@example.com", "second@example.com"]
            .into_iter()
            .map(|email| {
                let (path, config, barrier) = (path.clone(), config.clone(), Arc::clone(&barrier));
                let request = RegistrationRequest {
                    e_mail: email.into(),
                    password: "long-enough".into(),
                    name: "Racer".into(),
                    captcha: code.clone(),
                    captcha_secret: secret.clone(),
                };
                thread::spawn(move || {
                    let mut conn = open(&path);
                    barrier.wait();
                    register(&mut conn, &config, &request, now())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(ApiError::Validation(e)) if e.contains("captcha"))));

        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)).unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn restore_code_changes_password() {
        let mut conn = open_db();
        let config = config();
        let user_id = add_user(&conn, "forgetful@example.com", false);

        let (user, code) = prepare_restore(&conn, &RestoreRequest { email: "forgetful@example.com".into() }).unwrap();
        assert_eq!(user.id, user_id);
        users_db_operations::set_restore_code(&conn, user.id, &code).unwrap();

        let (captcha_code, secret) = captcha(&conn, &config);
        let request = PasswordChangeRequest {
            code: code.clone(),
            password: "brand-new-pass".into(),
            captcha: captcha_code,
            captcha_secret: secret,
        };
        assert_eq!(change_password(&mut conn, &config, &request, now()).unwrap(), "forgetful@example.com");
        assert!(users_db_operations::read_user_by_code(&conn, &code).unwrap().is_none());
        assert_eq!(restore_link("http://blog.test/", &code), format!("http://blog.test/login/change-password/{}", code));
    }

    #[test]
    fn moderators_see_queue_size() {
        let conn = open_db();
        add_user(&conn, "mod@example.com", true);
        let moderator = users_db_operations::read_user_by_email(&conn, "mod@example.com").unwrap().unwrap();
        let dto = user_dto(&conn, &moderator).unwrap();
        assert_eq!(dto.moderation, Some(true));
        assert_eq!(dto.moderation_count, Some(0));
    }
}
