use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            ledger::{LedgerStore, LedgerTx},
            payment_gateway::{PaymentGatewayPort, RefundPaymentRequest},
        },
        use_cases::settlement::apply_processed_refund,
    },
    domain::{
        entities::{
            purchase::PurchaseStatus,
            refund_request::{
                NewRefundRequest, REFUND_WINDOW_DAYS, RefundRequest, RefundStatus, RefundTarget,
            },
        },
        money::to_minor_units,
    },
};

const GATEWAY_CALL_LEASE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct RequestRefundInput {
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    #[serde(default)]
    pub purchase_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRefundAction {
    Approve,
    Process,
    Reject,
    MarkProcessed,
}

/// Snapshot of the refundable entity a request points at.
struct RefundableTarget {
    user_id: Uuid,
    amount: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
    gateway_payment_id: Option<String>,
    eligible: bool,
}

pub struct RefundUseCases {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGatewayPort>,
}

impl RefundUseCases {
    pub fn new(ledger: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGatewayPort>) -> Self {
        Self { ledger, gateway }
    }

    pub async fn request_refund(
        &self,
        user_id: Uuid,
        input: RequestRefundInput,
    ) -> AppResult<RefundRequest> {
        let target = RefundTarget::from_parts(input.subscription_id, input.purchase_id)
            .ok_or_else(|| {
                AppError::InvalidInput(
                    "Exactly one of subscription_id or purchase_id is required".into(),
                )
            })?;
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput("A reason is required".into()));
        }

        let mut tx = self.ledger.begin().await?;
        let refundable = load_target(tx.as_mut(), target)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        if !refundable.eligible {
            return Err(AppError::InvalidState(
                "Only completed purchases and current subscriptions can be refunded".into(),
            ));
        }
        if tx.open_refund_for_target(target).await?.is_some() {
            return Err(AppError::InvalidState(
                "A refund request for this item is already open".into(),
            ));
        }

        let days_elapsed = (Utc::now() - refundable.created_at).num_days();
        if days_elapsed > REFUND_WINDOW_DAYS {
            return Err(AppError::RefundWindowExpired {
                days_elapsed,
                window_days: REFUND_WINDOW_DAYS,
            });
        }
        if refundable.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount("Nothing was charged for this item".into()));
        }

        let (subscription_id, purchase_id) = match target {
            RefundTarget::Subscription(id) => (Some(id), None),
            RefundTarget::Purchase(id) => (None, Some(id)),
        };
        let request = tx
            .insert_refund(&NewRefundRequest {
                user_id,
                subscription_id,
                purchase_id,
                amount: refundable.amount,
                currency: refundable.currency,
                reason: reason.to_string(),
                status: RefundStatus::Pending,
                gateway_payment_id: refundable.gateway_payment_id,
                gateway_refund_id: None,
            })
            .await?;
        tx.commit().await?;

        info!(refund_id = %request.id, user_id = %user_id, amount = %request.amount, "Refund requested");
        Ok(request)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<RefundRequest>> {
        let mut tx = self.ledger.begin().await?;
        tx.refunds_for_user(user_id).await
    }

    pub async fn list_for_admin(&self, status: Option<RefundStatus>) -> AppResult<Vec<RefundRequest>> {
        let mut tx = self.ledger.begin().await?;
        tx.refunds_by_status(status).await
    }

    pub async fn admin_action(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        action: AdminRefundAction,
        note: Option<String>,
    ) -> AppResult<RefundRequest> {
        let note = note.as_deref().map(str::trim).filter(|n| !n.is_empty());
        match action {
            AdminRefundAction::Approve => self.approve(admin_id, refund_id, note).await,
            AdminRefundAction::Process => self.process(admin_id, refund_id, note).await,
            AdminRefundAction::Reject => self.reject(admin_id, refund_id, note).await,
            AdminRefundAction::MarkProcessed => {
                self.mark_processed(admin_id, refund_id, note).await
            }
        }
    }

    /// pending -> approved. No money moves.
    pub async fn approve(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<RefundRequest> {
        let mut tx = self.ledger.begin().await?;
        let mut request = load_refund(tx.as_mut(), refund_id).await?;
        transition(&mut request, RefundStatus::Approved)?;
        request.processed_by = Some(admin_id);
        if let Some(note) = note {
            request.add_note(note);
        }
        tx.save_refund(&request).await?;
        tx.commit().await?;

        info!(refund_id = %refund_id, admin_id = %admin_id, "Refund approved");
        Ok(request)
    }

    /// Approves if needed, refunds through the gateway and cascades.
    ///
    /// A gateway failure leaves the request approved with a note so the
    /// operator can retry.
    pub async fn process(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<RefundRequest> {
        let mut tx = self.ledger.begin().await?;
        let mut request = load_refund(tx.as_mut(), refund_id).await?;
        if request.status == RefundStatus::Pending {
            transition(&mut request, RefundStatus::Approved)?;
        }
        if request.status != RefundStatus::Approved {
            return Err(AppError::InvalidState(format!(
                "Refund is {}, only approved refunds can be processed",
                request.status
            )));
        }
        let started_at = Utc::now();
        if request.gateway_call_in_flight(started_at, gateway_call_lease()) {
            return Err(AppError::InvalidState(
                "A gateway refund for this request is already in flight".into(),
            ));
        }
        let Some(gateway_payment_id) = request.gateway_payment_id.clone() else {
            return Err(AppError::InvalidState(
                "No gateway payment recorded, use mark_processed after refunding manually".into(),
            ));
        };
        let amount_minor = to_minor_units(request.amount)?;
        request.processed_by = Some(admin_id);
        request.processing_started_at = Some(started_at);
        if let Some(note) = note {
            request.add_note(note);
        }
        tx.save_refund(&request).await?;
        // Approval and the in-flight marker are durable before any money moves.
        tx.commit().await?;

        let mut notes = BTreeMap::new();
        notes.insert("refund_request_id".to_string(), request.id.to_string());
        notes.insert("reason".to_string(), request.reason.clone());
        let result = self
            .gateway
            .refund(RefundPaymentRequest {
                payment_id: gateway_payment_id,
                amount_minor,
                idempotency_key: request.id.to_string(),
                notes,
            })
            .await;

        let mut tx = self.ledger.begin().await?;
        let mut request = load_refund(tx.as_mut(), refund_id).await?;
        request.processing_started_at = None;

        let gateway_refund = match result {
            Ok(refund) => refund,
            Err(err) => {
                error!(
                    refund_id = %refund_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Gateway refund failed"
                );
                request.add_note(&format!("Gateway refund failed: {err}"));
                request.updated_at = Utc::now();
                tx.save_refund(&request).await?;
                tx.commit().await?;
                return Err(err);
            }
        };

        // The refund.processed webhook may have beaten us here.
        if request.status == RefundStatus::Processed {
            tx.save_refund(&request).await?;
            tx.commit().await?;
            return Ok(request);
        }
        if let Err(err) = transition(&mut request, RefundStatus::Processed) {
            // Money moved but the request went elsewhere meanwhile. Keep the
            // gateway id so the refund stays traceable and reconcilable.
            error!(
                refund_id = %refund_id,
                gateway_refund_id = %gateway_refund.id,
                status = %request.status,
                "Gateway refund issued for a request that can no longer be processed"
            );
            request.gateway_refund_id = Some(gateway_refund.id.clone());
            request.add_note(&format!(
                "Gateway refund {} issued while request was {}",
                gateway_refund.id, request.status
            ));
            request.updated_at = Utc::now();
            tx.save_refund(&request).await?;
            tx.commit().await?;
            return Err(err);
        }

        let now = Utc::now();
        request.mark_processed(Some(&gateway_refund.id), Some(admin_id), now);
        tx.save_refund(&request).await?;
        apply_processed_refund(tx.as_mut(), &request, now).await?;
        tx.commit().await?;

        info!(
            refund_id = %refund_id,
            gateway_refund_id = %gateway_refund.id,
            admin_id = %admin_id,
            "Refund processed"
        );
        Ok(request)
    }

    /// pending | approved -> rejected. Terminal.
    pub async fn reject(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<RefundRequest> {
        let mut tx = self.ledger.begin().await?;
        let mut request = load_refund(tx.as_mut(), refund_id).await?;
        if request.gateway_call_in_flight(Utc::now(), gateway_call_lease()) {
            return Err(AppError::InvalidState(
                "A gateway refund for this request is in flight".into(),
            ));
        }
        transition(&mut request, RefundStatus::Rejected)?;
        request.processed_by = Some(admin_id);
        request.processed_at = Some(request.updated_at);
        if let Some(note) = note {
            request.add_note(note);
        }
        tx.save_refund(&request).await?;
        tx.commit().await?;

        info!(refund_id = %refund_id, admin_id = %admin_id, "Refund rejected");
        Ok(request)
    }

    /// Manual reconciliation when the money was returned outside the gateway
    /// flow. Applies the same cascade as a gateway refund.
    pub async fn mark_processed(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<RefundRequest> {
        let mut tx = self.ledger.begin().await?;
        let mut request = load_refund(tx.as_mut(), refund_id).await?;
        if request.status == RefundStatus::Pending {
            transition(&mut request, RefundStatus::Approved)?;
        }
        transition(&mut request, RefundStatus::Processed)?;

        let now = Utc::now();
        request.mark_processed(None, Some(admin_id), now);
        request.add_note(note.unwrap_or("Marked processed manually"));
        tx.save_refund(&request).await?;
        apply_processed_refund(tx.as_mut(), &request, now).await?;
        tx.commit().await?;

        info!(refund_id = %refund_id, admin_id = %admin_id, "Refund marked processed");
        Ok(request)
    }
}

/// How long a started gateway call blocks another attempt on the same request.
fn gateway_call_lease() -> Duration {
    Duration::minutes(GATEWAY_CALL_LEASE_MINUTES)
}

fn transition(request: &mut RefundRequest, next: RefundStatus) -> AppResult<()> {
    if !request.status.can_transition_to(next) {
        return Err(AppError::InvalidState(format!(
            "Refund cannot move from {} to {}",
            request.status, next
        )));
    }
    request.status = next;
    request.updated_at = Utc::now();
    Ok(())
}

async fn load_refund(tx: &mut dyn LedgerTx, refund_id: Uuid) -> AppResult<RefundRequest> {
    tx.refund_by_id(refund_id).await?.ok_or(AppError::NotFound)
}

async fn load_target(
    tx: &mut dyn LedgerTx,
    target: RefundTarget,
) -> AppResult<Option<RefundableTarget>> {
    let refundable = match target {
        RefundTarget::Subscription(id) => {
            let Some(subscription) = tx.subscription_by_id(id).await? else {
                return Ok(None);
            };
            // The plan price moves with upgrades. Only the payment the refund
            // goes against says how much can be returned.
            let charged = match subscription.gateway_payment_id.as_deref() {
                Some(payment_id) => tx.payment_by_gateway_payment_id(payment_id).await?,
                None => None,
            };
            let (amount, currency) = match charged {
                Some(payment) => (payment.amount, payment.currency),
                None => (Decimal::ZERO, subscription.currency),
            };
            Some(RefundableTarget {
                user_id: subscription.user_id,
                amount,
                currency,
                created_at: subscription.created_at,
                gateway_payment_id: subscription.gateway_payment_id,
                eligible: subscription.status.accepts_renewal(),
            })
        }
        RefundTarget::Purchase(id) => tx.purchase_by_id(id).await?.map(|p| RefundableTarget {
            user_id: p.user_id,
            amount: p.amount,
            currency: p.currency,
            created_at: p.created_at,
            gateway_payment_id: p.gateway_payment_id,
            eligible: p.status == PurchaseStatus::Completed,
        }),
    };
    Ok(refundable)
}
