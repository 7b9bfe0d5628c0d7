use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::subscription::{NewSubscription, Subscription, SubscriptionStatus},
};

const SELECT_COLS: &str = r#"
    id, user_id, plan_id, status, amount, currency, billing_interval,
    current_period_start, current_period_end, pending_plan_id,
    cancel_at_period_end, cancelled_at,
    gateway_order_id, gateway_payment_id, gateway_subscription_id,
    created_at, updated_at
"#;

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        status: row.get("status"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        interval: row.get("billing_interval"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        pending_plan_id: row.get("pending_plan_id"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        cancelled_at: row.get("cancelled_at"),
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_subscription_id: row.get("gateway_subscription_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Subscription>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM subscriptions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_subscription))
}

pub(super) async fn by_gateway_id(
    conn: &mut PgConnection,
    gateway_subscription_id: &str,
) -> AppResult<Option<Subscription>> {
    let row = sqlx::query(&format!(
        "SELECT {SELECT_COLS} FROM subscriptions WHERE gateway_subscription_id = $1 FOR UPDATE"
    ))
    .bind(gateway_subscription_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(row_to_subscription))
}

pub(super) async fn granting_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> AppResult<Vec<Subscription>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM subscriptions
        WHERE user_id = $1 AND status IN ('active', 'pending_downgrade')
        ORDER BY created_at DESC
        FOR UPDATE
        "#
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(row_to_subscription).collect())
}

pub(super) async fn due_for_rollover(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
    limit: i64,
) -> AppResult<Vec<Subscription>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {SELECT_COLS} FROM subscriptions
        WHERE gateway_subscription_id IS NULL
          AND status IN ('active', 'pending_downgrade')
          AND current_period_end <= $1
        ORDER BY current_period_end
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(row_to_subscription).collect())
}

pub(super) async fn insert(
    conn: &mut PgConnection,
    input: &NewSubscription,
) -> AppResult<Subscription> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscriptions (
            id, user_id, plan_id, status, amount, currency, billing_interval,
            current_period_start, current_period_end,
            gateway_order_id, gateway_payment_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {SELECT_COLS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.user_id)
    .bind(input.plan_id)
    .bind(SubscriptionStatus::Active)
    .bind(input.amount)
    .bind(&input.currency)
    .bind(input.interval)
    .bind(input.current_period_start)
    .bind(input.current_period_end)
    .bind(&input.gateway_order_id)
    .bind(&input.gateway_payment_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_subscription(row))
}

pub(super) async fn save(conn: &mut PgConnection, subscription: &Subscription) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE subscriptions SET
            plan_id = $2, status = $3, amount = $4, currency = $5, billing_interval = $6,
            current_period_start = $7, current_period_end = $8, pending_plan_id = $9,
            cancel_at_period_end = $10, cancelled_at = $11,
            gateway_order_id = $12, gateway_payment_id = $13, gateway_subscription_id = $14,
            updated_at = $15
        WHERE id = $1
        "#,
    )
    .bind(subscription.id)
    .bind(subscription.plan_id)
    .bind(subscription.status)
    .bind(subscription.amount)
    .bind(&subscription.currency)
    .bind(subscription.interval)
    .bind(subscription.current_period_start)
    .bind(subscription.current_period_end)
    .bind(subscription.pending_plan_id)
    .bind(subscription.cancel_at_period_end)
    .bind(subscription.cancelled_at)
    .bind(&subscription.gateway_order_id)
    .bind(&subscription.gateway_payment_id)
    .bind(&subscription.gateway_subscription_id)
    .bind(subscription.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
