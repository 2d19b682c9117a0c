use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::agent::toolkit::ToolResponse;
use crate::api::rest::error::ApiResult;
use crate::api::rest::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunParams {
    pub task: String,
}

/// POST /run?task=<text> — classify the instruction onto one operation
/// and return its result unchanged.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
) -> ApiResult<Json<ToolResponse>> {
    info!("Running task: {}", params.task);
    let response = state.dispatcher.dispatch(&params.task).await?;
    Ok(Json(response))
}
