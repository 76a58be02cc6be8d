use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::net::SocketAddr;

use crate::error::AppError;
use crate::models::CurrentUser;
use crate::AppState;

/// Address filter for every `/api` route, registration included
pub async fn whitelist_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_whitelist(&state.config.server.ip_whitelist, &request)?;
    Ok(next.run(request).await)
}

/// Authentication middleware
/// Resolves HTTP Basic credentials into a per-request driver
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Get Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let (user_id, password) = match auth_header {
        Some(header) if header.starts_with("Basic ") => decode_basic(&header[6..])?,
        _ => {
            return Err(AppError::Unauthorized(
                "Missing or invalid Authorization header".to_string(),
            ));
        }
    };

    let driver = state.sessions.open_session(&user_id, &password).await?;

    let current_user = CurrentUser { id: user_id };
    request.extensions_mut().insert(current_user);
    request.extensions_mut().insert(driver);

    Ok(next.run(request).await)
}

/// Split `user:password` out of a Basic credential
fn decode_basic(encoded: &str) -> Result<(String, String), AppError> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::Unauthorized("Malformed Basic credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AppError::Unauthorized("Malformed Basic credentials".to_string()))?;

    match decoded.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok((user.to_string(), password.to_string())),
        _ => Err(AppError::Unauthorized("Malformed Basic credentials".to_string())),
    }
}

fn check_whitelist(whitelist: &[String], request: &Request) -> Result<(), AppError> {
    if whitelist.is_empty() {
        return Ok(());
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    match ip {
        Some(ip) if whitelist.iter().any(|allowed| allowed == &ip) => Ok(()),
        Some(ip) => {
            tracing::warn!("Rejected connection from {}", ip);
            Err(AppError::Forbidden("Address not allowed".to_string()))
        }
        None => Err(AppError::Forbidden("Unknown client address".to_string())),
    }
}
