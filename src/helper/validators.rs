use crate::config::{PasswordConfig, PostsConfig};
use crate::error::ValidationErrors;
use crate::helper::sanitization_helpers::plain_text;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

/// Format of the `time` field of post create/edit requests.
pub const POST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9_.-]+\.[a-zA-Z]+$").expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

pub fn is_valid_password(password: &str, config: &PasswordConfig) -> bool {
    let length = password.chars().count();
    config.min <= length && length <= config.max
}

pub fn validate_email_format(email: &str, field: &'static str, errors: &mut ValidationErrors) -> bool {
    if is_valid_email(email) {
        return true;
    }
    errors.add(field, "Wrong e-mail format.");
    false
}

pub fn validate_password(password: &str, config: &PasswordConfig, errors: &mut ValidationErrors) {
    if !is_valid_password(password, config) {
        errors.add(
            "password",
            format!("Wrong password. Password has to be from {} up to {} chars.", config.min, config.max),
        );
    }
}

pub fn validate_name(name: &str, config: &PostsConfig, errors: &mut ValidationErrors) {
    let length = name.trim().chars().count();
    if length == 0 {
        errors.add("name", "Name cannot be empty.");
    } else if length > config.name_max {
        errors.add("name", format!("Name cannot be longer than {} chars.", config.name_max));
    }
}

pub fn validate_title(title: &str, config: &PostsConfig, errors: &mut ValidationErrors) {
    let length = plain_text(title).chars().count();
    if length < config.title_min || length > config.title_max {
        errors.add(
            "title",
            format!("Title has to be from {} up to {} chars.", config.title_min, config.title_max),
        );
    }
}

pub fn validate_text(text: &str, config: &PostsConfig, errors: &mut ValidationErrors) {
    if plain_text(text).chars().count() < config.text_min {
        errors.add("text", format!("Post text has to be at least {} chars.", config.text_min));
    }
}

pub fn validate_comment_text(text: &str, config: &PostsConfig, errors: &mut ValidationErrors) {
    if plain_text(text).chars().count() < config.comment_min {
        errors.add("text", format!("Comment has to be at least {} chars.", config.comment_min));
    }
}

pub fn parse_post_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), POST_TIME_FORMAT).ok()
}
