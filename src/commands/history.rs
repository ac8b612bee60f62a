use crate::error::AppError;
use crate::monitor::history::HistoryState;
use crate::state::AppState;

pub async fn history_refresh(state: &AppState) -> Result<HistoryState, AppError> {
    let mut history = state.history.lock().await;
    Ok(history.refresh().await)
}

/// Current history state, including `loading` while a refresh is in flight.
pub fn history_state(state: &AppState) -> HistoryState {
    state.history_state.read().clone()
}

pub async fn history_page(state: &AppState, offset: u64) -> Result<HistoryState, AppError> {
    let mut history = state.history.lock().await;
    let page_size = history.page_size();
    history.fetch_transactions(page_size, offset).await?;
    Ok(history.state())
}

/// Deletes every stored row. The caller is responsible for confirmation.
pub async fn history_clear(state: &AppState) -> Result<HistoryState, AppError> {
    let mut history = state.history.lock().await;
    history.clear().await?;
    Ok(history.state())
}
