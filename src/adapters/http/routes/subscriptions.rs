use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    adapters::http::{app_state::AppState, auth::current_user_id},
    app_error::AppResult,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscriptions/current", get(current_subscription))
        .route("/subscriptions/cancel", post(cancel_subscription))
}

async fn current_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;
    let subscription = app_state.subscription_use_cases.current(user_id).await?;
    Ok(Json(subscription))
}

async fn cancel_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;
    let subscription = app_state
        .subscription_use_cases
        .cancel_at_period_end(user_id)
        .await?;
    Ok(Json(subscription))
}
