use sqlx::PgPool;

use crate::app_error::AppError;

pub mod catalog;
pub mod ledger;
mod merch_order;
mod payment_history;
mod purchase;
mod refund_request;
mod subscription;
mod webhook_event;

const MAX_JSON_LOG_LEN: usize = 200;

/// Parse a JSON column into `T`, logging a warning on failure.
///
/// SQL NULL yields the default silently; only real parse failures are logged.
pub fn parse_json_with_fallback<T: serde::de::DeserializeOwned + Default>(
    json: &serde_json::Value,
    field_name: &str,
    entity_type: &str,
    entity_id: &str,
) -> T {
    if json.is_null() {
        return T::default();
    }

    serde_json::from_value(json.clone()).unwrap_or_else(|err| {
        let raw_str = json.to_string();
        let truncated = if raw_str.len() > MAX_JSON_LOG_LEN {
            format!("{}...", raw_str.chars().take(MAX_JSON_LOG_LEN).collect::<String>())
        } else {
            raw_str
        };

        tracing::warn!(
            field = field_name,
            entity_type = entity_type,
            entity_id = entity_id,
            raw_json = %truncated,
            error = %err,
            "Failed to parse JSON field, using default value"
        );
        T::default()
    })
}

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
    default_currency: String,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool, default_currency: String) -> Self {
        PostgresPersistence {
            pool,
            default_currency,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Catalog rows may leave the currency unset.
    pub(crate) fn currency_or_default(&self, currency: Option<String>) -> String {
        currency.unwrap_or_else(|| self.default_currency.clone())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    // A concurrent request got there first; the partial unique
                    // indexes back the one-active-subscription and
                    // one-completed-purchase invariants.
                    tracing::warn!(constraint = ?db_err.constraint(), "Unique constraint violated");
                    AppError::InvalidState("Conflicting concurrent update, retry".into())
                } else if db_err.is_foreign_key_violation() {
                    AppError::InvalidInput("Referenced record not found".into())
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
