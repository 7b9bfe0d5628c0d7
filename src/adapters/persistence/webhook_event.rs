use sqlx::PgConnection;

use crate::app_error::AppResult;

pub(super) async fn seen(conn: &mut PgConnection, event_id: &str) -> AppResult<bool> {
    let row = sqlx::query("SELECT 1 FROM webhook_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub(super) async fn record(
    conn: &mut PgConnection,
    event_id: &str,
    event_type: &str,
    outcome: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO webhook_events (event_id, event_type, outcome)
        VALUES ($1, $2, $3)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(outcome)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
