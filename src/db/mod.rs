use crate::error::AppError;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILENAME: &str = "pulse-monitor.db";
const DEFAULT_DATA_DIR: &str = ".pulse-monitor";

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_db_path() -> Result<PathBuf, AppError> {
    let mut base_dir = env_value("PULSE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    std::fs::create_dir_all(&base_dir)?;
    base_dir.push(env_value("APP_DB_FILENAME").unwrap_or_else(|| DEFAULT_DB_FILENAME.to_string()));
    Ok(base_dir)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn initialize_pool_from_path(path: &Path) -> Result<SqlitePool, AppError> {
    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(connect_options).await?;
    run_migrations(&pool).await?;

    Ok(pool)
}

pub async fn initialize_pool() -> Result<SqlitePool, AppError> {
    let db_path = resolve_db_path()?;
    tracing::info!(path = %db_path.display(), "opening preferences database");
    initialize_pool_from_path(&db_path).await
}
