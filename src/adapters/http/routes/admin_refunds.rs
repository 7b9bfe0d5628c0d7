use axum::{
    Json, Router,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, auth::current_admin_id},
    app_error::{AppError, AppResult},
    domain::entities::refund_request::{RefundRequest, RefundStatus},
    use_cases::refunds::AdminRefundAction,
};

#[derive(Deserialize)]
struct AdminActionPayload {
    refund_id: Uuid,
    action: AdminRefundAction,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct RefundsResponse {
    items: Vec<RefundRequest>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/refunds", post(admin_action).get(list_refunds))
}

async fn admin_action(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AdminActionPayload>,
) -> AppResult<impl IntoResponse> {
    let admin_id = current_admin_id(&headers, &app_state)?;

    let request = app_state
        .refund_use_cases
        .admin_action(admin_id, payload.refund_id, payload.action, payload.note)
        .await?;

    Ok(Json(request))
}

async fn list_refunds(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    current_admin_id(&headers, &app_state)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<RefundStatus>)
        .transpose()
        .map_err(AppError::InvalidInput)?;

    let items = app_state.refund_use_cases.list_for_admin(status).await?;
    Ok(Json(RefundsResponse { items }))
}
