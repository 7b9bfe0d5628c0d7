use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    adapters::http::{app_state::AppState, auth::current_user_id},
    app_error::AppResult,
    domain::entities::payment_record::PaymentRecord,
    use_cases::payment_verification::VerifyPaymentInput,
};

#[derive(Serialize)]
struct PaymentsResponse {
    items: Vec<PaymentRecord>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/verify", post(verify_payment))
}

async fn verify_payment(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyPaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;

    let outcome = app_state
        .payment_verification_use_cases
        .verify(user_id, payload)
        .await?;

    Ok(Json(outcome))
}

async fn list_payments(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user_id(&headers, &app_state)?;
    let items = app_state
        .subscription_use_cases
        .payment_history(user_id)
        .await?;
    Ok(Json(PaymentsResponse { items }))
}
