use crate::error::AppError;
use crate::monitor::persistence::{
    get_preferences, save_preferences, DashboardPreferences, SavePreferencesArgs,
};
use crate::state::AppState;

pub async fn preferences_get(state: &AppState) -> Result<DashboardPreferences, AppError> {
    get_preferences(&state.db_pool).await
}

pub async fn preferences_save(
    state: &AppState,
    args: SavePreferencesArgs,
) -> Result<DashboardPreferences, AppError> {
    let saved = save_preferences(&state.db_pool, args).await?;
    state
        .history
        .lock()
        .await
        .set_page_size(saved.history_page_size);
    Ok(saved)
}
