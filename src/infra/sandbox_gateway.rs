use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::payment_gateway::{
        CreateOrderRequest, GatewayOrder, GatewayRefund, PaymentGatewayPort, RefundPaymentRequest,
    },
    infra::gateway_signer::GatewaySigner,
};

/// Local stand-in for the gateway.
///
/// Orders and refunds are minted without any network call. Signatures are
/// still checked with the configured secrets, so a checkout client can sign
/// `order_id|payment_id` itself to exercise the verification path end to end.
#[derive(Clone)]
pub struct SandboxGateway {
    key_id: String,
    signer: GatewaySigner,
}

impl SandboxGateway {
    pub fn new(key_id: String, signer: GatewaySigner) -> Self {
        Self { key_id, signer }
    }
}

#[async_trait]
impl PaymentGatewayPort for SandboxGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder> {
        let order = GatewayOrder {
            id: format!("order_sandbox_{}", Uuid::new_v4().simple()),
            amount_minor: request.amount_minor,
            currency: request.currency,
        };
        info!(order_id = %order.id, receipt = %request.receipt, "Sandbox order created");
        Ok(order)
    }

    async fn refund(&self, request: RefundPaymentRequest) -> AppResult<GatewayRefund> {
        // Same key, same refund.
        let refund = GatewayRefund {
            id: format!("rfnd_sandbox_{}", request.idempotency_key.replace('-', "")),
        };
        info!(
            refund_id = %refund.id,
            payment_id = %request.payment_id,
            amount_minor = request.amount_minor,
            "Sandbox refund issued"
        );
        Ok(refund)
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> AppResult<()> {
        self.signer.verify_payment(order_id, payment_id, signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> AppResult<()> {
        self.signer.verify_webhook(body, signature)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use secrecy::SecretString;

    use super::*;

    fn sandbox() -> SandboxGateway {
        SandboxGateway::new(
            "rzp_test_sandbox".into(),
            GatewaySigner::new(
                SecretString::new("key_secret".into()),
                SecretString::new("whsec".into()),
            ),
        )
    }

    #[tokio::test]
    async fn orders_echo_amount_with_sandbox_ids() {
        let order = sandbox()
            .create_order(CreateOrderRequest {
                amount_minor: 84950,
                currency: "INR".into(),
                receipt: "rcpt_1".into(),
                notes: BTreeMap::new(),
            })
            .await
            .unwrap();
        assert!(order.id.starts_with("order_sandbox_"));
        assert_eq!(order.amount_minor, 84950);
        assert_eq!(order.currency, "INR");
    }

    #[tokio::test]
    async fn refund_ids_follow_the_idempotency_key() {
        let gateway = sandbox();
        let request = |key: &str| RefundPaymentRequest {
            payment_id: "pay_1".into(),
            amount_minor: 100,
            idempotency_key: key.into(),
            notes: BTreeMap::new(),
        };
        let a = gateway.refund(request("key-a")).await.unwrap();
        let replay = gateway.refund(request("key-a")).await.unwrap();
        let b = gateway.refund(request("key-b")).await.unwrap();
        assert!(a.id.starts_with("rfnd_sandbox_"));
        assert_eq!(a.id, replay.id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn signatures_are_still_enforced() {
        let gateway = sandbox();
        let sig = gateway.signer.sign_payment("order_1", "pay_1").unwrap();
        assert!(gateway.verify_payment_signature("order_1", "pay_1", &sig).is_ok());
        assert!(gateway.verify_payment_signature("order_1", "pay_1", "00").is_err());
    }
}
