use axum::{extract::State, Json};

use crate::correlation::TransferInfo;
use crate::error::{ApiResponse, Result};
use crate::AppState;

/// In-flight uploads and downloads
/// GET /api/transfers
pub async fn list_transfers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TransferInfo>>>> {
    Ok(Json(ApiResponse::success(
        state.correlator.registry().transfers(),
    )))
}
