use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        match &self {
            AppError::Database(_) | AppError::Internal(_) | AppError::GatewayRejected(_) => {
                tracing::error!(error = ?self, "Request failed")
            }
            _ => tracing::warn!(error = %self, "Request rejected"),
        }

        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::Unauthorized => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, None)
            }
            AppError::Forbidden => error_resp(StatusCode::FORBIDDEN, ErrorCode::Forbidden, None),
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::InvalidState(msg) => {
                error_resp(StatusCode::CONFLICT, ErrorCode::InvalidState, Some(msg))
            }
            AppError::InvalidAmount(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidAmount, Some(msg))
            }
            AppError::InvalidSignature => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidSignature, None)
            }
            AppError::RefundWindowExpired {
                days_elapsed,
                window_days,
            } => {
                let body = serde_json::json!({
                    "code": ErrorCode::RefundWindowExpired.as_str(),
                    "message": format!("Refunds are accepted within {window_days} days of purchase"),
                    "days_elapsed": days_elapsed,
                    "window_days": window_days,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            AppError::GatewayUnavailable(_) => error_resp(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::GatewayUnavailable,
                Some("Payment gateway unavailable, try again".into()),
            ),
            AppError::GatewayRejected(msg) => {
                error_resp(StatusCode::BAD_GATEWAY, ErrorCode::GatewayRejected, Some(msg))
            }
            AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
