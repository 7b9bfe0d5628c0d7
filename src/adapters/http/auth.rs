use axum::http::{HeaderMap, header};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt::{self, Claims},
};

fn bearer_claims(headers: &HeaderMap, app_state: &AppState) -> AppResult<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;
    jwt::verify(token, &app_state.config.jwt_secret)
}

pub fn current_user_id(headers: &HeaderMap, app_state: &AppState) -> AppResult<Uuid> {
    bearer_claims(headers, app_state)?.user_id()
}

/// Resolves the caller and requires the admin role.
pub fn current_admin_id(headers: &HeaderMap, app_state: &AppState) -> AppResult<Uuid> {
    let claims = bearer_claims(headers, app_state)?;
    let admin_id = claims.user_id()?;
    if !claims.is_admin() {
        tracing::warn!(user_id = %admin_id, "Non-admin called an admin route");
        return Err(AppError::Forbidden);
    }
    Ok(admin_id)
}
