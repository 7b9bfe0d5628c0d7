use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::error;

use crate::{adapters::http::app_state::AppState, app_error::AppError};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";
pub const EVENT_ID_HEADER: &str = "x-gateway-event-id";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/payment-gateway", post(payment_gateway_webhook))
}

/// Takes the raw body so the signature is checked over the exact bytes sent.
///
/// Only a bad signature is reported as a failure. Every other error is
/// logged and acknowledged, since the gateway would otherwise keep
/// redelivering an event the ledger cannot use.
async fn payment_gateway_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let event_id = header_str(&headers, EVENT_ID_HEADER);

    match app_state
        .webhook_reconciler
        .handle(&body, signature, event_id)
        .await
    {
        Ok(outcome) => Json(json!({ "status": outcome.as_str() })).into_response(),
        Err(AppError::InvalidSignature) => AppError::InvalidSignature.into_response(),
        Err(e) => {
            error!(
                error = %e,
                retryable = e.is_retryable(),
                event_id = ?event_id,
                "Webhook processing failed"
            );
            Json(json!({ "status": "error" })).into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
