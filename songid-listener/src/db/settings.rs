//! Settings database operations
//!
//! Key/value accessors over the `settings` table, plus the persisted
//! listening preferences (enable flag, language, region).

use crate::services::orchestrator::ListeningSettings;
use songid_common::{Error, Result};
use sqlx::{Pool, Sqlite};

const LISTENING_ENABLED_KEY: &str = "listening_enabled";
const LISTENING_LANGUAGE_KEY: &str = "listening_language";
const LISTENING_REGION_KEY: &str = "listening_region";

/// Load listening preferences, falling back to `defaults` per missing key
pub async fn load_listening_settings(
    db: &Pool<Sqlite>,
    defaults: &ListeningSettings,
) -> Result<ListeningSettings> {
    let enabled = get_setting::<bool>(db, LISTENING_ENABLED_KEY).await?;
    let language = get_setting::<String>(db, LISTENING_LANGUAGE_KEY).await?;
    let region = get_setting::<String>(db, LISTENING_REGION_KEY).await?;

    Ok(ListeningSettings {
        enabled: enabled.unwrap_or(defaults.enabled),
        language: language.unwrap_or_else(|| defaults.language.clone()),
        region: region.unwrap_or_else(|| defaults.region.clone()),
    })
}

/// Persist listening preferences
pub async fn save_listening_settings(db: &Pool<Sqlite>, settings: &ListeningSettings) -> Result<()> {
    set_setting(db, LISTENING_ENABLED_KEY, settings.enabled).await?;
    set_setting(db, LISTENING_LANGUAGE_KEY, &settings.language).await?;
    set_setting(db, LISTENING_REGION_KEY, &settings.region).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
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

/// Generic setting setter (insert or replace)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
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

/// Delete a setting; deleting a missing key is not an error
pub async fn remove_setting(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
