//! Client-driven settlement: the checkout client posts back the gateway's
//! order id, payment id and signature once the payment sheet closes.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{catalog::CatalogRepo, ledger::LedgerStore, payment_gateway::PaymentGatewayPort},
        use_cases::{
            orders::OrderUseCases,
            settlement::{fail_payment, settle_payment},
        },
    },
    domain::entities::{
        order_intent::OrderIntent,
        payment_record::{PaymentRecord, PaymentStatus, PaymentType},
        subscription::Subscription,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentInput {
    pub intent: OrderIntent,
    pub target_id: Uuid,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    /// False when the payment had already been settled by an earlier call or a webhook.
    pub newly_settled: bool,
    pub payment: Option<PaymentRecord>,
    pub subscription: Option<Subscription>,
}

pub struct PaymentVerificationUseCases {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogRepo>,
    gateway: Arc<dyn PaymentGatewayPort>,
    orders: OrderUseCases,
}

impl PaymentVerificationUseCases {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn CatalogRepo>,
        gateway: Arc<dyn PaymentGatewayPort>,
        orders: OrderUseCases,
    ) -> Self {
        Self {
            ledger,
            catalog,
            gateway,
            orders,
        }
    }

    pub async fn verify(&self, user_id: Uuid, input: VerifyPaymentInput) -> AppResult<VerifyOutcome> {
        // A downgrade never has an order; converge on the scheduled state.
        if input.intent == OrderIntent::SubscriptionDowngrade {
            let subscription = self
                .orders
                .schedule_downgrade(user_id, input.target_id)
                .await?;
            return Ok(VerifyOutcome {
                newly_settled: false,
                payment: None,
                subscription: Some(subscription),
            });
        }

        let order_id = required(input.order_id.as_deref(), "order_id")?;
        let payment_id = required(input.payment_id.as_deref(), "payment_id")?;
        let signature = required(input.signature.as_deref(), "signature")?;

        let mut tx = self.ledger.begin().await?;
        let mut payment = tx
            .payment_by_order_id(order_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        match payment.status {
            PaymentStatus::Completed => {
                info!(order_id = %order_id, "Payment already settled, replaying result");
                let subscription = match payment.ref_id {
                    Some(id) if is_subscription_payment(payment.payment_type) => {
                        tx.subscription_by_id(id).await?
                    }
                    _ => None,
                };
                return Ok(VerifyOutcome {
                    newly_settled: false,
                    payment: Some(payment),
                    subscription,
                });
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(AppError::InvalidState(format!(
                    "Payment is {}",
                    payment.status
                )));
            }
            PaymentStatus::Pending => {}
        }

        if PaymentType::for_intent(input.intent) != payment.payment_type
            || payment.metadata.target_id != Some(input.target_id)
        {
            return Err(AppError::InvalidState(
                "Order does not match the submitted intent".into(),
            ));
        }

        let now = Utc::now();

        if let Err(err) = self
            .gateway
            .verify_payment_signature(order_id, payment_id, signature)
        {
            warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                user_id = %user_id,
                "Payment signature mismatch"
            );
            if matches!(err, AppError::InvalidSignature) {
                fail_payment(tx.as_mut(), &mut payment, "signature_mismatch", now).await?;
                tx.commit().await?;
            }
            return Err(err);
        }

        let subscription = settle_payment(
            tx.as_mut(),
            self.catalog.as_ref(),
            &mut payment,
            payment_id,
            Some(signature),
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(VerifyOutcome {
            newly_settled: true,
            payment: Some(payment),
            subscription,
        })
    }
}

fn is_subscription_payment(payment_type: PaymentType) -> bool {
    matches!(
        payment_type,
        PaymentType::Subscription | PaymentType::SubscriptionUpgrade
    )
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!("{field} is required"))),
    }
}
