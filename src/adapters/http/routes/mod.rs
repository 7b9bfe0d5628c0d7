pub mod admin_refunds;
pub mod health;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod subscriptions;
pub mod webhooks;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(payments::router())
        .merge(webhooks::router())
        .merge(refunds::router())
        .merge(admin_refunds::router())
        .merge(subscriptions::router())
}
