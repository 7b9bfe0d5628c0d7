use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app_error::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    /// Merchant-side reference shown in the gateway dashboard.
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundPaymentRequest {
    pub payment_id: String,
    pub amount_minor: i64,
    /// Stable per refund request. The gateway answers a repeated key with the
    /// refund it already issued instead of moving money twice.
    pub idempotency_key: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
}

/// The external payment processor.
///
/// Network operations are stateless and may be retried by the caller.
/// Signature checks run locally against the shared secrets.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Public key id handed to the checkout client.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder>;

    async fn refund(&self, request: RefundPaymentRequest) -> AppResult<GatewayRefund>;

    /// Checks the client-submitted checkout signature over `order_id|payment_id`.
    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> AppResult<()>;

    /// Checks the webhook signature over the raw request body.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> AppResult<()>;
}
