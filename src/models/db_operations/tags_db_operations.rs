use crate::models::db_operations::posts_db_operations::PostFilter;
use crate::models::db_operations::DbError;
use crate::models::TagWeight;
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;

/// Lookup key of a tag name. Tags differing only in case share one key.
pub fn tag_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns the id of the tag with this name (case-insensitive), creating it if needed.
pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64, DbError> {
    let key = tag_key(name);
    conn.execute("INSERT OR IGNORE INTO tags (name, name_key) VALUES (?1, ?2)", params![name.trim(), key])?;
    Ok(conn.query_row("SELECT id FROM tags WHERE name_key = ?1", [&key], |row| row.get(0))?)
}

pub fn read_post_tags(conn: &Connection, post_id: i64) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t JOIN posts_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1 ORDER BY t.name_key",
    )?;
    let names = stmt.query_map([post_id], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Replaces the tag set of a post with `proposed`, touching only the rows that differ.
/// Names are trimmed; blanks and case-insensitive duplicates are ignored.
pub fn update_post_tags(conn: &Connection, post_id: i64, proposed: &[String]) -> Result<(), DbError> {
    let mut wanted: HashMap<String, &str> = HashMap::new();
    for name in proposed.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        wanted.entry(tag_key(name)).or_insert(name);
    }

    let current: HashMap<String, String> = read_post_tags(conn, post_id)?
        .into_iter()
        .map(|name| (tag_key(&name), name))
        .collect();

    for key in current.keys() {
        if !wanted.contains_key(key) {
            conn.execute(
                "DELETE FROM posts_tags WHERE post_id = ?1 AND tag_id = (SELECT id FROM tags WHERE name_key = ?2)",
                params![post_id, key],
            )?;
        }
    }

    for (key, name) in &wanted {
        if !current.contains_key(key) {
            let tag_id = get_or_create_tag(conn, name)?;
            conn.execute(
                "INSERT OR IGNORE INTO posts_tags (post_id, tag_id) VALUES (?1, ?2)",
                params![post_id, tag_id],
            )?;
        }
    }
    Ok(())
}

/// Relative frequency of every tag used on visible posts, normalized so the most
/// frequent tag weighs 1.0. `prefix` keeps only tags starting with it; weights are
/// still relative to the most frequent tag overall.
pub fn read_weighted_tags(
    conn: &Connection,
    now: NaiveDateTime,
    prefix: Option<&str>,
) -> Result<Vec<TagWeight>, DbError> {
    let filter = PostFilter::visible(now);
    let sql = format!(
        "SELECT t.name, COUNT(*) FROM tags t
         JOIN posts_tags pt ON pt.tag_id = t.id
         JOIN posts p ON p.id = pt.post_id
         WHERE {} GROUP BY t.id",
        filter.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let counts = stmt
        .query_map(params_from_iter(filter.values().iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let max = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    if max == 0 {
        return Ok(Vec::new());
    }

    let prefix = prefix.map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty());
    let mut weights: Vec<TagWeight> = counts
        .into_iter()
        .filter(|(name, _)| prefix.as_ref().map_or(true, |p| name.to_lowercase().starts_with(p.as_str())))
        .map(|(name, count)| TagWeight { name, weight: count as f64 / max as f64 })
        .collect();

    weights.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(weights)
}
