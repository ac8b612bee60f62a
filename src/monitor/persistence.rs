use crate::error::AppError;
use crate::monitor::control::{DEFAULT_THROTTLE, MAX_THROTTLE, MIN_THROTTLE};
use crate::monitor::reconciler::now_unix_ms;
use crate::monitor::types::{
    check_range, DEFAULT_HISTORY_PAGE_SIZE, MAX_HISTORY_PAGE_SIZE, MIN_HISTORY_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPreferences {
    pub throttle: u8,
    pub history_page_size: u32,
    pub updated_at_ms: i64,
}

/// Fields left out keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePreferencesArgs {
    pub throttle: Option<i64>,
    pub history_page_size: Option<u32>,
}

fn map_preferences_row(row: &sqlx::sqlite::SqliteRow) -> Result<DashboardPreferences, AppError> {
    let throttle_raw: i64 = row.try_get("throttle")?;
    let page_size_raw: i64 = row.try_get("history_page_size")?;

    let throttle = u8::try_from(throttle_raw)
        .map_err(|_| AppError::InvalidArgument(format!("stored throttle {throttle_raw} is invalid")))?;
    let history_page_size = u32::try_from(page_size_raw).map_err(|_| {
        AppError::InvalidArgument(format!("stored history_page_size {page_size_raw} is invalid"))
    })?;

    Ok(DashboardPreferences {
        throttle,
        history_page_size,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

async fn ensure_preferences_seed(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        "INSERT OR IGNORE INTO dashboard_preferences (id, throttle, history_page_size, updated_at_ms) VALUES (1, ?, ?, ?)",
    )
    .bind(i64::from(DEFAULT_THROTTLE))
    .bind(i64::from(DEFAULT_HISTORY_PAGE_SIZE))
    .bind(now_unix_ms())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_preferences(pool: &SqlitePool) -> Result<DashboardPreferences, AppError> {
    ensure_preferences_seed(pool).await?;

    let row = sqlx::query(
        "SELECT throttle, history_page_size, updated_at_ms FROM dashboard_preferences WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;

    map_preferences_row(&row)
}

pub async fn save_preferences(
    pool: &SqlitePool,
    args: SavePreferencesArgs,
) -> Result<DashboardPreferences, AppError> {
    let current = get_preferences(pool).await?;

    let throttle = match args.throttle {
        Some(value) => check_range(
            "throttle",
            value,
            i64::from(MIN_THROTTLE),
            i64::from(MAX_THROTTLE),
        )?,
        None => i64::from(current.throttle),
    };
    let history_page_size = match args.history_page_size {
        Some(value) => check_range(
            "historyPageSize",
            value,
            MIN_HISTORY_PAGE_SIZE,
            MAX_HISTORY_PAGE_SIZE,
        )?,
        None => current.history_page_size,
    };

    sqlx::query(
        "INSERT INTO dashboard_preferences (id, throttle, history_page_size, updated_at_ms) VALUES (1, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET throttle=excluded.throttle, history_page_size=excluded.history_page_size, updated_at_ms=excluded.updated_at_ms",
    )
    .bind(throttle)
    .bind(i64::from(history_page_size))
    .bind(now_unix_ms())
    .execute(pool)
    .await?;

    get_preferences(pool).await
}
