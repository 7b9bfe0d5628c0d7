use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        orders::OrderUseCases, payment_verification::PaymentVerificationUseCases,
        refunds::RefundUseCases, subscriptions::SubscriptionUseCases,
        webhook_reconciler::WebhookReconciler,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub order_use_cases: Arc<OrderUseCases>,
    pub payment_verification_use_cases: Arc<PaymentVerificationUseCases>,
    pub webhook_reconciler: Arc<WebhookReconciler>,
    pub refund_use_cases: Arc<RefundUseCases>,
    pub subscription_use_cases: Arc<SubscriptionUseCases>,
}
