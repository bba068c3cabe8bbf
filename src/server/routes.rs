use crate::error::SwapdbError;
use crate::server::router::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use swapdb_schema::SwapMessage;
use tracing::debug;

/// `GET /read/{key}`: `[<process id>] "<value>"`, 404 when the key is absent.
///
/// A key that is not an integer can never match a row, so it is reported as not found.
pub(super) async fn read_record(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<String, SwapdbError> {
    let Ok(id) = key.parse::<i64>() else {
        return Err(SwapdbError::NotFound(key));
    };

    let value = state
        .coordinator
        .storage()
        .read(id)
        .await?
        .ok_or_else(|| SwapdbError::NotFound(key))?;

    debug!(key = id, "Record served");
    Ok(format!("[{}] {:?}", state.coordinator.identity(), value))
}

/// `POST /swap`: announce a new candidate file to the whole fleet.
pub(super) async fn request_swap(
    State(state): State<AppState>,
) -> Result<Json<SwapMessage>, SwapdbError> {
    let msg = state.coordinator.request_swap().await?;
    Ok(Json(msg))
}

/// `GET /update`: same trigger as `/swap` with an empty body, kept for existing callers.
pub(super) async fn trigger_update(State(state): State<AppState>) -> Result<StatusCode, SwapdbError> {
    state.coordinator.request_swap().await?;
    Ok(StatusCode::OK)
}
