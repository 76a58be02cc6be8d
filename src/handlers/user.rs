use axum::{extract::State, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{CreateUserRequest, CurrentUser, UserResponse};
use crate::services::UserService;
use crate::AppState;

/// Register a principal
/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserService::create_user(&state.db, req).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// The authenticated principal
/// GET /api/users/me
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = UserService::get_user(&state.db, &current_user.id).await?;
    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}
