use crate::config::CaptchaConfig;
use crate::error::ValidationErrors;
use crate::models::db_operations::{captcha_db_operations, DbError};
use crate::models::dto::CaptchaDto;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, NaiveDateTime};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;
use uuid::Uuid;

pub fn generate_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Renders the code as a slightly distorted SVG and returns it as a data URI.
pub fn render_data_uri(code: &str, font_size: u32) -> String {
    let mut rng = rand::thread_rng();
    let char_width = font_size as f64 * 0.75;
    let width = (char_width * code.chars().count() as f64 + font_size as f64).ceil() as u32;
    let height = font_size * 2;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="white"/>"#,
        w = width,
        h = height
    );

    for _ in 0..4 {
        svg.push_str(&format!(
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#999" stroke-width="1"/>"##,
            rng.gen_range(0..width),
            rng.gen_range(0..height),
            rng.gen_range(0..width),
            rng.gen_range(0..height)
        ));
    }

    for (i, c) in code.chars().enumerate() {
        let x = font_size as f64 / 2.0 + i as f64 * char_width;
        let y = font_size as f64 * 1.4 + rng.gen_range(-3.0..3.0);
        let angle: i32 = rng.gen_range(-20..=20);
        svg.push_str(&format!(
            r#"<text x="{x:.1}" y="{y:.1}" font-family="serif" font-size="{size}" transform="rotate({angle} {x:.1} {y:.1})">{c}</text>"#,
            x = x,
            y = y,
            size = font_size,
            angle = angle,
            c = html_escape::encode_text(&c.to_string())
        ));
    }
    svg.push_str("</svg>");

    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

/// Purges expired captchas and stores a fresh one.
pub fn issue_captcha(conn: &Connection, config: &CaptchaConfig, now: NaiveDateTime) -> Result<CaptchaDto, DbError> {
    let purged = captcha_db_operations::delete_outdated(conn, now - Duration::hours(config.ttl_hours))?;
    if purged > 0 {
        log::debug!("Purged {} outdated captcha codes.", purged);
    }

    let code = generate_code(config.length);
    let secret = Uuid::new_v4().to_string();
    captcha_db_operations::insert_captcha(conn, &code, &secret, now)?;

    Ok(CaptchaDto { secret, image: render_data_uri(&code, config.font_size) })
}

/// A captcha passes when its secret is known, it is younger than the TTL and the
/// code matches exactly.
pub fn is_valid_captcha(
    conn: &Connection,
    code: &str,
    secret: &str,
    config: &CaptchaConfig,
    now: NaiveDateTime,
) -> Result<bool, DbError> {
    let Some(captcha) = captcha_db_operations::read_captcha_by_secret(conn, secret)? else {
        return Ok(false);
    };
    let fresh = captcha.time > now - Duration::hours(config.ttl_hours);
    Ok(fresh && captcha.is_valid_code(code))
}

pub fn validate_captcha(
    conn: &Connection,
    code: &str,
    secret: &str,
    config: &CaptchaConfig,
    now: NaiveDateTime,
    errors: &mut ValidationErrors,
) -> Result<(), DbError> {
    if !is_valid_captcha(conn, code, secret, config, now)? {
        errors.add("captcha", "The code from the picture is wrong.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::db_operations::test_support::{backdate_captcha, now, open_db};

    fn stored_code(conn: &Connection, secret: &str) -> String {
        captcha_db_operations::read_captcha_by_secret(conn, secret).unwrap().unwrap().code
    }

    #[test]
    fn generated_code_has_configured_length() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn image_is_an_svg_data_uri() {
        let uri = render_data_uri("abc123", 18);
        let payload = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(">a</text>"));
    }

    #[test]
    fn fresh_captcha_with_right_code_passes() {
        let conn = open_db();
        let config = Config::with_paths("/tmp/data", "/tmp/upload").unwrap().captcha;
        let dto = issue_captcha(&conn, &config, now()).unwrap();
        let code = stored_code(&conn, &dto.secret);

        assert!(is_valid_captcha(&conn, &code, &dto.secret, &config, now()).unwrap());
        assert!(!is_valid_captcha(&conn, "wrong", &dto.secret, &config, now()).unwrap());
        assert!(!is_valid_captcha(&conn, &code, "unknown-secret", &config, now()).unwrap());
    }

    #[test]
    fn expired_captcha_fails_even_with_right_code() {
        let conn = open_db();
        let config = Config::with_paths("/tmp/data", "/tmp/upload").unwrap().captcha;
        let dto = issue_captcha(&conn, &config, now()).unwrap();
        let code = stored_code(&conn, &dto.secret);
        backdate_captcha(&conn, &dto.secret, now() - Duration::hours(config.ttl_hours) - Duration::minutes(1));

        assert!(!is_valid_captcha(&conn, &code, &dto.secret, &config, now()).unwrap());
        let mut errors = ValidationErrors::new();
        validate_captcha(&conn, &code, &dto.secret, &config, now(), &mut errors).unwrap();
        assert!(errors.contains("captcha"));
    }
}
