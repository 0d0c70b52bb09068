use crate::error::ApiResult;
use crate::models::db_operations::posts_db_operations;
use crate::models::dto::{format_time, CalendarDto, StatisticsDto};
use chrono::{Datelike, NaiveDateTime};
use rusqlite::Connection;

/// Statistics over visible posts, for one author or the whole blog.
pub fn statistics(conn: &Connection, now: NaiveDateTime, author_id: Option<i64>) -> ApiResult<StatisticsDto> {
    let stats = posts_db_operations::read_statistics(conn, now, author_id)?;
    Ok(StatisticsDto {
        posts_count: stats.posts_count,
        likes_count: stats.likes_count,
        dislikes_count: stats.dislikes_count,
        views_count: stats.views_count,
        first_publication: stats.first_publication.as_ref().map(format_time),
    })
}

/// Publication years plus per-day post counts of `year` (the current year when absent).
pub fn calendar(conn: &Connection, now: NaiveDateTime, year: Option<i32>) -> ApiResult<CalendarDto> {
    let year = year.filter(|y| *y > 0).unwrap_or_else(|| now.year());
    Ok(CalendarDto {
        years: posts_db_operations::read_publication_years(conn, now)?,
        posts: posts_db_operations::count_posts_per_day(conn, now, year)?,
    })
}
