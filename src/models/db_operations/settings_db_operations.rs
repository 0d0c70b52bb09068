use crate::models::db_operations::DbError;
use crate::models::{setting_codes, GlobalSettings};
use rusqlite::{params, Connection};

/// Loads the three global flags. Missing rows fall back to the defaults.
pub fn read_settings(conn: &Connection) -> Result<GlobalSettings, DbError> {
    let mut settings = GlobalSettings::default();
    let mut stmt = conn.prepare("SELECT code, value FROM global_settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    for row in rows {
        let (code, value) = row?;
        let enabled = value.eq_ignore_ascii_case("YES");
        match code.as_str() {
            setting_codes::MULTIUSER_MODE => settings.multiuser_mode = enabled,
            setting_codes::POST_PREMODERATION => settings.post_premoderation = enabled,
            setting_codes::STATISTICS_IS_PUBLIC => settings.statistics_is_public = enabled,
            other => log::warn!("Ignoring unknown global setting '{}'", other),
        }
    }
    Ok(settings)
}

pub fn update_settings(conn: &mut Connection, settings: &GlobalSettings) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    for (code, enabled) in [
        (setting_codes::MULTIUSER_MODE, settings.multiuser_mode),
        (setting_codes::POST_PREMODERATION, settings.post_premoderation),
        (setting_codes::STATISTICS_IS_PUBLIC, settings.statistics_is_public),
    ] {
        tx.execute(
            "UPDATE global_settings SET value = ?1 WHERE code = ?2",
            params![if enabled { "YES" } else { "NO" }, code],
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::test_support::open_db;

    #[test]
    fn settings_default_to_enabled_and_can_be_switched_off() {
        let mut conn = open_db();
        assert_eq!(read_settings(&conn).unwrap(), GlobalSettings::default());

        let updated = GlobalSettings { multiuser_mode: false, post_premoderation: true, statistics_is_public: false };
        update_settings(&mut conn, &updated).unwrap();
        assert_eq!(read_settings(&conn).unwrap(), updated);
    }
}
