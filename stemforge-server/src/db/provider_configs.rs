//! Provider config persistence and usage accounting
//!
//! The registry consults these rows at dispatch time: a provider whose
//! declared quota is spent inside its window is skipped as a miss.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::ProviderConfig;
use stemforge_common::time;

/// Load a provider config row
pub async fn load_config(pool: &SqlitePool, service_name: &str) -> Result<Option<ProviderConfig>> {
    let row = sqlx::query("SELECT * FROM provider_configs WHERE service_name = ?")
        .bind(service_name)
        .fetch_optional(pool)
        .await?;

    row.map(|row| config_from_row(&row)).transpose()
}

/// Check the declarative quota for a service
///
/// Returns false when the service is disabled or its window is exhausted.
/// Missing rows are allowed: only admin-curated services carry quotas.
pub async fn dispatch_allowed(pool: &SqlitePool, service_name: &str) -> Result<bool> {
    let Some(config) = load_config(pool, service_name).await? else {
        return Ok(true);
    };

    if !config.is_enabled {
        return Ok(false);
    }

    Ok(!config.is_exhausted(Utc::now()))
}

/// Record one dispatch against the service's quota window
///
/// Opens a fresh window when `usage_reset_at` has elapsed, otherwise
/// increments the current counter. Services without a configured limit are
/// not tracked.
pub async fn record_dispatch(pool: &SqlitePool, service_name: &str) -> Result<()> {
    let Some(config) = load_config(pool, service_name).await? else {
        return Ok(());
    };
    if config.rate_limit.is_none() {
        return Ok(());
    }

    let now = Utc::now();
    if config.window_elapsed(now) {
        let window = config.rate_window_seconds.unwrap_or(3600);
        let reset_at = now + Duration::seconds(window);
        sqlx::query(
            "UPDATE provider_configs SET current_usage = 1, usage_reset_at = ? WHERE service_name = ?",
        )
        .bind(time::to_rfc3339(reset_at))
        .bind(service_name)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "UPDATE provider_configs SET current_usage = current_usage + 1 WHERE service_name = ?",
        )
        .bind(service_name)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn config_from_row(row: &SqliteRow) -> Result<ProviderConfig> {
    let usage_reset_at: Option<String> = row.get("usage_reset_at");
    let config: Option<String> = row.get("config");

    Ok(ProviderConfig {
        service_name: row.get("service_name"),
        api_key: row.get("api_key"),
        api_secret: row.get("api_secret"),
        priority: row.get("priority"),
        is_enabled: row.get::<i64, _>("is_enabled") != 0,
        rate_limit: row.get("rate_limit"),
        rate_window_seconds: row.get("rate_window_seconds"),
        current_usage: row.get("current_usage"),
        usage_reset_at: time::parse_opt_rfc3339(usage_reset_at)?,
        config: config.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}
