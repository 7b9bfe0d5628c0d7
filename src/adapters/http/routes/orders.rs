use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};

use crate::{
    adapters::http::{app_state::AppState, auth::current_user_id},
    app_error::AppResult,
    use_cases::orders::{CreateOrderInput, OrderOutcome},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/orders", post(create_order))
}

async fn create_order(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;

    let outcome = app_state
        .order_use_cases
        .create_order(user_id, payload)
        .await?;

    let status = match outcome {
        OrderOutcome::PaymentRequired { .. } => StatusCode::CREATED,
        OrderOutcome::Applied { .. } | OrderOutcome::Scheduled { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
