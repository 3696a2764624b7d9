//! Key-value settings table accessors

use crate::{Error, Result};
use sqlx::SqlitePool;

/// Setting key for the OpenAI API key
pub const OPENAI_API_KEY_SETTING: &str = "openai_api_key";

/// Setting key for the maximum database lock wait (ms)
pub const MAX_LOCK_WAIT_SETTING: &str = "database_max_lock_wait_ms";

/// Read a setting and parse it
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Write a setting (insert or replace)
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: ToString,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Maximum time to retry on "database is locked" (default 5000ms)
pub async fn get_max_lock_wait_ms(db: &SqlitePool) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_SETTING)
        .await
        .map(|opt| opt.unwrap_or(5000))
}
