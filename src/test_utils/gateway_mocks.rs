use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CreateOrderRequest, GatewayOrder, GatewayRefund, PaymentGatewayPort, RefundPaymentRequest,
    },
    infra::gateway_signer::GatewaySigner,
};

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "test_key_secret";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFailure {
    Unavailable,
    Rejected,
    /// The gateway acts on the call but the response never arrives.
    LostResponse,
}

impl GatewayFailure {
    fn to_error(self) -> AppError {
        match self {
            GatewayFailure::Unavailable | GatewayFailure::LostResponse => {
                AppError::GatewayUnavailable("connection reset".into())
            }
            GatewayFailure::Rejected => AppError::GatewayRejected("BAD_REQUEST_ERROR".into()),
        }
    }
}

/// Recording gateway that mints sequential ids and signs with the test secrets.
pub struct InMemoryGateway {
    signer: GatewaySigner,
    pub orders: Mutex<Vec<CreateOrderRequest>>,
    pub refunds: Mutex<Vec<RefundPaymentRequest>>,
    order_failure: Mutex<Option<GatewayFailure>>,
    refund_failure: Mutex<Option<GatewayFailure>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self {
            signer: test_signer(),
            orders: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
            order_failure: Mutex::new(None),
            refund_failure: Mutex::new(None),
        }
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_orders(self, failure: GatewayFailure) -> Self {
        *self.order_failure.lock().unwrap() = Some(failure);
        self
    }

    pub fn failing_refunds(self, failure: GatewayFailure) -> Self {
        *self.refund_failure.lock().unwrap() = Some(failure);
        self
    }

    /// Lets later calls succeed again.
    pub fn recover(&self) {
        *self.order_failure.lock().unwrap() = None;
        *self.refund_failure.lock().unwrap() = None;
    }

    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> String {
        self.signer.sign_payment(order_id, payment_id).unwrap()
    }

    pub fn sign_webhook(&self, body: &[u8]) -> String {
        self.signer.sign_webhook(body).unwrap()
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn refund_requests(&self) -> Vec<RefundPaymentRequest> {
        self.refunds.lock().unwrap().clone()
    }
}

pub fn test_signer() -> GatewaySigner {
    GatewaySigner::new(
        SecretString::from(TEST_KEY_SECRET),
        SecretString::from(TEST_WEBHOOK_SECRET),
    )
}

#[async_trait]
impl PaymentGatewayPort for InMemoryGateway {
    fn key_id(&self) -> &str {
        TEST_KEY_ID
    }

    async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder> {
        if let Some(failure) = *self.order_failure.lock().unwrap() {
            return Err(failure.to_error());
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_test_{}", orders.len()),
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }

    async fn refund(&self, request: RefundPaymentRequest) -> AppResult<GatewayRefund> {
        let failure = *self.refund_failure.lock().unwrap();
        if let Some(failure) = failure.filter(|f| *f != GatewayFailure::LostResponse) {
            return Err(failure.to_error());
        }

        let mut refunds = self.refunds.lock().unwrap();
        let position = match refunds
            .iter()
            .position(|r| r.idempotency_key == request.idempotency_key)
        {
            Some(existing) => existing,
            None => {
                refunds.push(request);
                refunds.len() - 1
            }
        };

        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        Ok(GatewayRefund {
            id: format!("rfnd_test_{}", position + 1),
        })
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
