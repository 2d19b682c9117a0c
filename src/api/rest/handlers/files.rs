use axum::extract::{Query, State};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::rest::error::{ApiError, ApiResult};
use crate::api::rest::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub path: String,
}

/// GET /read?path=<path> — raw file contents from under the data root.
pub async fn read_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadParams>,
) -> ApiResult<String> {
    match state.guard.read(&params.path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => Err(ApiError::Internal(e.into())),
    }
}
