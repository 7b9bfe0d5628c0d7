use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Refund window of {window_days} days expired ({days_elapsed} days elapsed)")]
    RefundWindowExpired { days_elapsed: i64, window_days: i64 },

    /// Downstream gateway call failed or timed out. Safe for the caller to retry.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Gateway understood the call and refused it. Retrying will not help.
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether repeating the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::GatewayUnavailable(_) | AppError::Internal(_)
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidInput,
    InvalidState,
    InvalidAmount,
    InvalidSignature,
    RefundWindowExpired,
    GatewayUnavailable,
    GatewayRejected,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::RefundWindowExpired => "REFUND_WINDOW_EXPIRED",
            ErrorCode::GatewayUnavailable => "GATEWAY_UNAVAILABLE",
            ErrorCode::GatewayRejected => "GATEWAY_REJECTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
