use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::Serialize;

use crate::{
    adapters::http::{app_state::AppState, auth::current_user_id},
    app_error::AppResult,
    domain::entities::refund_request::RefundRequest,
    use_cases::refunds::RequestRefundInput,
};

#[derive(Serialize)]
struct RefundsResponse {
    items: Vec<RefundRequest>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/refunds", post(request_refund).get(list_refunds))
}

async fn request_refund(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestRefundInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;

    let request = app_state
        .refund_use_cases
        .request_refund(user_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_refunds(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;
    let items = app_state.refund_use_cases.list_for_user(user_id).await?;
    Ok(Json(RefundsResponse { items }))
}
