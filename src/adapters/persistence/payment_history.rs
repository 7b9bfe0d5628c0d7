use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::parse_json_with_fallback,
    app_error::{AppError, AppResult},
    domain::entities::payment_record::{NewPaymentRecord, PaymentMetadata, PaymentRecord},
};

const SELECT_COLS: &str = r#"
    id, user_id, payment_type, amount, currency, status,
    gateway_order_id, gateway_payment_id, gateway_signature,
    metadata, ref_type, ref_id, created_at, updated_at
"#;

fn row_to_payment(row: sqlx::postgres::PgRow) -> PaymentRecord {
    let id: Uuid = row.get("id");
    let metadata: serde_json::Value = row.get("metadata");
    PaymentRecord {
        id,
        user_id: row.get("user_id"),
        payment_type: row.get("payment_type"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: row.get("status"),
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_signature: row.get("gateway_signature"),
        metadata: parse_json_with_fallback(&metadata, "metadata", "payment_history", &id.to_string()),
        ref_type: row.get("ref_type"),
        ref_id: row.get("ref_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn metadata_json(metadata: &PaymentMetadata) -> AppResult<serde_json::Value> {
    serde_json::to_value(metadata)
        .map_err(|e| AppError::Internal(format!("Failed to encode payment metadata: {e}")))
}

pub(super) async fn by_order_id(
    conn: &mut PgConnection,
    gateway_order_id: &str,
) -> AppResult<Option<PaymentRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM payment_history WHERE gateway_order_id = $1 FOR UPDATE"
    ))
    .bind(gateway_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_payment))
}

pub(super) async fn by_gateway_payment_id(
    conn: &mut PgConnection,
    gateway_payment_id: &str,
) -> AppResult<Option<PaymentRecord>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM payment_history
        WHERE gateway_payment_id = $1 AND payment_type <> 'refund'
        FOR UPDATE
        "#
    ))
    .bind(gateway_payment_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_payment))
}

pub(super) async fn insert(
    conn: &mut PgConnection,
    input: &NewPaymentRecord,
) -> AppResult<PaymentRecord> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO payment_history (
            id, user_id, payment_type, amount, currency, status,
            gateway_order_id, gateway_payment_id, metadata, ref_type, ref_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(input.payment_type)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(input.status)
    .bind(&input.gateway_order_id)
    .bind(&input.gateway_payment_id)
    .bind(metadata_json(&input.metadata)?)
    .bind(input.ref_type)
    .bind(input.ref_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_payment(row))
}

pub(super) async fn save(conn: &mut PgConnection, payment: &PaymentRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE payment_history SET
            status = $2, gateway_payment_id = $3, gateway_signature = $4,
            metadata = $5, ref_type = $6, ref_id = $7, updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(payment.status)
    .bind(&payment.gateway_payment_id)
    .bind(&payment.gateway_signature)
    .bind(metadata_json(&payment.metadata)?)
    .bind(payment.ref_type)
    .bind(payment.ref_id)
    .bind(payment.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(super) async fn for_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM payment_history WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(row_to_payment).collect())
}
