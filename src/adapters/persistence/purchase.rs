use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        catalog::ContentKind,
        purchase::{NewPurchase, Purchase, PurchaseStatus},
    },
};

const SELECT_COLS: &str = r#"
    id, user_id, content_kind, content_id, amount, currency, status,
    gateway_order_id, gateway_payment_id, gateway_signature, created_at, updated_at
"#;

fn row_to_purchase(row: sqlx::postgres::PgRow) -> Purchase {
    Purchase {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content_kind: row.get("content_kind"),
        content_id: row.get("content_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: row.get("status"),
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_signature: row.get("gateway_signature"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Purchase>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM purchases WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_purchase))
}

pub(super) async fn by_order_id(
    conn: &mut PgConnection,
    gateway_order_id: &str,
) -> AppResult<Option<Purchase>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM purchases WHERE gateway_order_id = $1 FOR UPDATE"
    ))
    .bind(gateway_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_purchase))
}

pub(super) async fn completed(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: ContentKind,
    content_id: Uuid,
) -> AppResult<Option<Purchase>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM purchases
        WHERE user_id = $1 AND content_kind = $2 AND content_id = $3 AND status = 'completed'
        "#
    ))
    .bind(user_id)
    .bind(kind)
    .bind(content_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_purchase))
}

pub(super) async fn insert(conn: &mut PgConnection, input: &NewPurchase) -> AppResult<Purchase> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO purchases (
            id, user_id, content_kind, content_id, amount, currency, status, gateway_order_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(input.content_kind)
    .bind(input.content_id)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(PurchaseStatus::Pending)
    .bind(&input.gateway_order_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_purchase(row))
}

pub(super) async fn save(conn: &mut PgConnection, purchase: &Purchase) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE purchases SET
            status = $2, gateway_payment_id = $3, gateway_signature = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(purchase.id)
    .bind(purchase.status)
    .bind(&purchase.gateway_payment_id)
    .bind(&purchase.gateway_signature)
    .bind(purchase.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
