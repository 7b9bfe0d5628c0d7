use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::refund_request::{
        NewRefundRequest, RefundRequest, RefundStatus, RefundTarget,
    },
};

const SELECT_COLS: &str = r#"
    id, user_id, subscription_id, purchase_id, amount, currency, reason, status,
    gateway_payment_id, gateway_refund_id, admin_note, processed_by, processed_at,
    processing_started_at, created_at, updated_at
"#;

fn row_to_refund(row: sqlx::postgres::PgRow) -> RefundRequest {
    RefundRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subscription_id: row.get("subscription_id"),
        purchase_id: row.get("purchase_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        reason: row.get("reason"),
        status: row.get("status"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_refund_id: row.get("gateway_refund_id"),
        admin_note: row.get("admin_note"),
        processed_by: row.get("processed_by"),
        processed_at: row.get("processed_at"),
        processing_started_at: row.get("processing_started_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<RefundRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM refund_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_refund))
}

pub(super) async fn by_gateway_refund_id(
    conn: &mut PgConnection,
    gateway_refund_id: &str,
) -> AppResult<Option<RefundRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM refund_requests WHERE gateway_refund_id = $1 FOR UPDATE"
    ))
    .bind(gateway_refund_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_refund))
}

pub(super) async fn open_for_payment(
    conn: &mut PgConnection,
    gateway_payment_id: &str,
) -> AppResult<Option<RefundRequest>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM refund_requests
        WHERE gateway_payment_id = $1 AND status IN ('pending', 'approved')
        ORDER BY created_at DESC
        LIMIT 1
        FOR UPDATE
        "#
    ))
    .bind(gateway_payment_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_refund))
}

pub(super) async fn open_for_target(
    conn: &mut PgConnection,
    target: RefundTarget,
) -> AppResult<Option<RefundRequest>> {
    let (column, id) = match target {
        RefundTarget::Subscription(id) => ("subscription_id", id),
        RefundTarget::Purchase(id) => ("purchase_id", id),
    };
    let row = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM refund_requests
        WHERE {column} = $1 AND status IN ('pending', 'approved')
        LIMIT 1
        FOR UPDATE
        "#
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_refund))
}

pub(super) async fn insert(
    conn: &mut PgConnection,
    input: &NewRefundRequest,
) -> AppResult<RefundRequest> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO refund_requests (
            id, user_id, subscription_id, purchase_id, amount, currency, reason, status,
            gateway_payment_id, gateway_refund_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(input.subscription_id)
    .bind(input.purchase_id)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(&input.reason)
    .bind(input.status)
    .bind(&input.gateway_payment_id)
    .bind(&input.gateway_refund_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_refund(row))
}

pub(super) async fn save(conn: &mut PgConnection, refund: &RefundRequest) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE refund_requests SET
            status = $2, gateway_refund_id = $3, admin_note = $4,
            processed_by = $5, processed_at = $6, processing_started_at = $7,
            updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(refund.id)
    .bind(refund.status)
    .bind(&refund.gateway_refund_id)
    .bind(&refund.admin_note)
    .bind(refund.processed_by)
    .bind(refund.processed_at)
    .bind(refund.processing_started_at)
    .bind(refund.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(super) async fn for_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<RefundRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM refund_requests WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(row_to_refund).collect())
}

pub(super) async fn by_status(
    conn: &mut PgConnection,
    status: Option<RefundStatus>,
) -> AppResult<Vec<RefundRequest>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!(
                "SELECT {SELECT_COLS} FROM refund_requests WHERE status = $1 ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {SELECT_COLS} FROM refund_requests ORDER BY created_at DESC"
            ))
            .fetch_all(&mut *conn)
            .await?
        }
    };
    Ok(rows.into_iter().map(row_to_refund).collect())
}
