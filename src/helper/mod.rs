use chrono::{NaiveDateTime, Timelike, Utc};

pub mod auth_helpers;
pub mod captcha_helpers;
pub mod comment_helpers;
pub mod media_helpers;
pub mod post_helpers;
pub mod profile_helpers;
pub mod sanitization_helpers;
pub mod stats_helpers;
pub mod validators;

/// Current UTC time at second precision, the resolution timestamps are stored with.
pub fn utc_now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
