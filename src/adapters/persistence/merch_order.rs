use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::merch_order::{MerchOrder, MerchOrderStatus, NewMerchOrder},
};

const SELECT_COLS: &str = r#"
    id, user_id, merch_item_id, quantity, amount, currency, status, shipping_address,
    gateway_order_id, gateway_payment_id, created_at, updated_at
"#;

fn row_to_merch_order(row: sqlx::postgres::PgRow) -> MerchOrder {
    MerchOrder {
        id: row.get("id"),
        user_id: row.get("user_id"),
        merch_item_id: row.get("merch_item_id"),
        quantity: row.get("quantity"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: row.get("status"),
        shipping_address: row.get("shipping_address"),
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<MerchOrder>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM merch_orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_merch_order))
}

pub(super) async fn insert(conn: &mut PgConnection, input: &NewMerchOrder) -> AppResult<MerchOrder> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO merch_orders (
            id, user_id, merch_item_id, quantity, amount, currency, status,
            shipping_address, gateway_order_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(input.merch_item_id)
    .bind(input.quantity)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(MerchOrderStatus::Pending)
    .bind(&input.shipping_address)
    .bind(&input.gateway_order_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_merch_order(row))
}

pub(super) async fn save(conn: &mut PgConnection, order: &MerchOrder) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE merch_orders SET status = $2, gateway_payment_id = $3, updated_at = $4
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.status)
    .bind(&order.gateway_payment_id)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
