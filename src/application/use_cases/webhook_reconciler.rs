//! Gateway-driven reconciliation.
//!
//! Each handler finds its row by a gateway-assigned id and applies a
//! transition only from a legal predecessor status. Anything else is a no-op,
//! which absorbs redelivery and out-of-order arrival.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            catalog::CatalogRepo,
            ledger::{LedgerStore, LedgerTx},
            payment_gateway::PaymentGatewayPort,
        },
        use_cases::settlement::{apply_processed_refund, fail_payment, settle_payment},
    },
    domain::{
        billing_period::advance_period,
        entities::{
            payment_record::{
                NewPaymentRecord, PaymentMetadata, PaymentStatus, PaymentType, RefType,
            },
            refund_request::{NewRefundRequest, RefundRequest, RefundStatus},
            subscription::{Subscription, SubscriptionStatus},
        },
        gateway_event::{
            GatewayEvent, InvoiceEntity, PaymentEntity, RefundEntity, SubscriptionEntity, note,
        },
        money::{from_minor_units, to_minor_units},
    },
};

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// No legal transition from the current state, or no matching row.
    Skipped(&'static str),
    /// Known event type with no ledger representation.
    Observed,
    /// Event id already processed.
    Duplicate,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Skipped(_) => "skipped",
            WebhookOutcome::Observed => "observed",
            WebhookOutcome::Duplicate => "duplicate",
        }
    }
}

pub struct WebhookReconciler {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogRepo>,
    gateway: Arc<dyn PaymentGatewayPort>,
}

impl WebhookReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn CatalogRepo>,
        gateway: Arc<dyn PaymentGatewayPort>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            gateway,
        }
    }

    /// Rejects the delivery when the body signature does not match.
    /// Nothing is parsed or applied before this check passes.
    pub fn authenticate(&self, body: &[u8], signature: Option<&str>) -> AppResult<()> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        self.gateway.verify_webhook_signature(body, signature)
    }

    /// Authenticates, parses and applies one delivery.
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
        event_id: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        self.authenticate(body, signature)?;
        let event = GatewayEvent::parse(body)?;
        self.apply(event, event_id).await
    }

    pub async fn apply(
        &self,
        event: GatewayEvent,
        event_id: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        let event_type = event.event_type().to_string();
        let mut tx = self.ledger.begin().await?;

        if let Some(event_id) = event_id
            && tx.webhook_event_seen(event_id).await?
        {
            info!(event_id = %event_id, event_type = %event_type, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        let now = Utc::now();
        let outcome = match event {
            GatewayEvent::PaymentCaptured(p) => self.payment_captured(tx.as_mut(), p, now).await?,
            GatewayEvent::PaymentFailed(p) => payment_failed(tx.as_mut(), p, now).await?,
            GatewayEvent::RefundCreated(r) => refund_created(tx.as_mut(), r, now).await?,
            GatewayEvent::RefundProcessed(r) => refund_processed(tx.as_mut(), r, now).await?,
            GatewayEvent::RefundFailed(r) => refund_failed(tx.as_mut(), r, now).await?,
            GatewayEvent::SubscriptionCharged {
                subscription,
                payment,
            } => {
                self.subscription_charged(tx.as_mut(), subscription, payment, now)
                    .await?
            }
            GatewayEvent::SubscriptionHalted(s) | GatewayEvent::SubscriptionPending(s) => {
                pause_subscription(tx.as_mut(), &s, now).await?
            }
            GatewayEvent::SubscriptionCancelled(s) => {
                end_subscription(tx.as_mut(), &s, SubscriptionStatus::Cancelled, now).await?
            }
            GatewayEvent::SubscriptionCompleted(s) => {
                end_subscription(tx.as_mut(), &s, SubscriptionStatus::Expired, now).await?
            }
            GatewayEvent::InvoiceExpired(invoice) => {
                invoice_expired(tx.as_mut(), &invoice, now).await?
            }
            GatewayEvent::Observed { event_type } => {
                // Disputes, transfers and settlements are intentionally not acted on.
                info!(event_type = %event_type, "Webhook observed, no ledger action");
                WebhookOutcome::Observed
            }
            GatewayEvent::Unknown { event_type } => {
                warn!(event_type = %event_type, "Unhandled webhook event type");
                WebhookOutcome::Skipped("unhandled event type")
            }
        };

        if let Some(event_id) = event_id {
            tx.record_webhook_event(event_id, &event_type, outcome.as_str())
                .await?;
        }
        tx.commit().await?;

        match outcome {
            WebhookOutcome::Skipped(reason) => {
                info!(event_type = %event_type, reason = reason, "Webhook skipped")
            }
            _ => info!(event_type = %event_type, outcome = outcome.as_str(), "Webhook processed"),
        }
        Ok(outcome)
    }

    async fn payment_captured(
        &self,
        tx: &mut dyn LedgerTx,
        captured: PaymentEntity,
        now: DateTime<Utc>,
    ) -> AppResult<WebhookOutcome> {
        let payment = match &captured.order_id {
            Some(order_id) => tx.payment_by_order_id(order_id).await?,
            None => None,
        };
        let payment = match payment {
            Some(p) => Some(p),
            None => tx.payment_by_gateway_payment_id(&captured.id).await?,
        };
        let Some(mut payment) = payment else {
            warn!(
                gateway_payment_id = %captured.id,
                order_id = ?captured.order_id,
                "Captured payment has no ledger row"
            );
            return Ok(WebhookOutcome::Skipped("no matching payment"));
        };

        if !payment.status.accepts_capture() {
            return Ok(WebhookOutcome::Skipped("payment already settled"));
        }

        if let Ok(expected) = to_minor_units(payment.amount)
            && captured.amount != 0
            && captured.amount != expected
        {
            warn!(
                payment_id = %payment.id,
                expected_minor = expected,
                captured_minor = captured.amount,
                "Captured amount differs from the order amount"
            );
        }

        settle_payment(
            tx,
            self.catalog.as_ref(),
            &mut payment,
            &captured.id,
            None,
            now,
        )
        .await?;
        Ok(WebhookOutcome::Applied)
    }

    async fn subscription_charged(
        &self,
        tx: &mut dyn LedgerTx,
        entity: SubscriptionEntity,
        charge: Option<PaymentEntity>,
        now: DateTime<Utc>,
    ) -> AppResult<WebhookOutcome> {
        let Some(mut subscription) = find_subscription(tx, &entity, now).await? else {
            return Ok(WebhookOutcome::Skipped("no matching subscription"));
        };
        if !subscription.status.accepts_renewal() {
            return Ok(WebhookOutcome::Skipped("subscription is terminal"));
        }

        if let Some(charge) = &charge
            && tx.payment_by_gateway_payment_id(&charge.id).await?.is_some()
        {
            return Ok(WebhookOutcome::Skipped("charge already recorded"));
        }

        let (period_start, period_end) = entity.current_period().unwrap_or_else(|| {
            let start = subscription.current_period_end;
            (start, advance_period(start, subscription.interval))
        });
        if period_end <= subscription.current_period_end {
            return Ok(WebhookOutcome::Skipped("period already applied"));
        }

        if let Some(pending_plan_id) = subscription.pending_plan_id.take() {
            match self.catalog.plan(pending_plan_id).await? {
                Some(plan) => {
                    info!(
                        subscription_id = %subscription.id,
                        from_plan = %subscription.plan_id,
                        to_plan = %plan.id,
                        "Applying scheduled downgrade at renewal"
                    );
                    subscription.plan_id = plan.id;
                    subscription.amount = plan.price;
                    subscription.currency = plan.currency;
                    subscription.interval = plan.interval;
                }
                None => warn!(
                    subscription_id = %subscription.id,
                    plan_id = %pending_plan_id,
                    "Scheduled plan no longer exists, keeping current plan"
                ),
            }
        }

        let was_paused = subscription.status == SubscriptionStatus::Paused;
        let blocked = was_paused
            && tx
                .granting_subscriptions(subscription.user_id)
                .await?
                .iter()
                .any(|s| s.id != subscription.id);
        if blocked {
            warn!(
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                "Renewal charged on a paused subscription that has been replaced, needs a refund"
            );
        } else {
            subscription.status = SubscriptionStatus::Active;
        }

        subscription.current_period_start = period_start;
        subscription.current_period_end = period_end;
        subscription.cancel_at_period_end = false;
        subscription.updated_at = now;
        if let Some(charge) = &charge {
            subscription.gateway_payment_id = Some(charge.id.clone());
        }
        tx.save_subscription(&subscription).await?;

        let amount = match &charge {
            Some(c) if c.amount > 0 => from_minor_units(c.amount),
            _ => subscription.amount,
        };
        tx.insert_payment(&NewPaymentRecord {
            user_id: subscription.user_id,
            payment_type: PaymentType::SubscriptionRenewal,
            amount,
            currency: charge
                .as_ref()
                .and_then(|c| c.currency.clone())
                .unwrap_or_else(|| subscription.currency.clone()),
            status: PaymentStatus::Completed,
            gateway_order_id: charge.as_ref().and_then(|c| c.order_id.clone()),
            gateway_payment_id: charge.as_ref().map(|c| c.id.clone()),
            metadata: PaymentMetadata {
                period_start: Some(period_start),
                period_end: Some(period_end),
                ..Default::default()
            },
            ref_type: Some(RefType::Subscription),
            ref_id: Some(subscription.id),
        })
        .await?;

        info!(
            subscription_id = %subscription.id,
            period_end = %period_end,
            "Subscription renewed"
        );
        Ok(WebhookOutcome::Applied)
    }
}

async fn payment_failed(
    tx: &mut dyn LedgerTx,
    failed: PaymentEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let payment = match &failed.order_id {
        Some(order_id) => tx.payment_by_order_id(order_id).await?,
        None => None,
    };
    let Some(mut payment) = payment else {
        return Ok(WebhookOutcome::Skipped("no matching payment"));
    };
    if payment.status != PaymentStatus::Pending {
        return Ok(WebhookOutcome::Skipped("payment not pending"));
    }

    let reason = failed
        .error_description
        .as_deref()
        .unwrap_or("gateway reported failure");
    payment.gateway_payment_id.get_or_insert(failed.id);
    fail_payment(tx, &mut payment, reason, now).await?;
    Ok(WebhookOutcome::Applied)
}

async fn refund_created(
    tx: &mut dyn LedgerTx,
    refund: RefundEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    if tx.refund_by_gateway_refund_id(&refund.id).await?.is_some() {
        return Ok(WebhookOutcome::Skipped("refund already known"));
    }

    if let Some(mut request) = tx.open_refund_for_payment(&refund.payment_id).await? {
        request.gateway_refund_id = Some(refund.id.clone());
        if request.status == RefundStatus::Pending {
            request.status = RefundStatus::Approved;
        }
        request.updated_at = now;
        tx.save_refund(&request).await?;
        info!(refund_id = %request.id, gateway_refund_id = %refund.id, "Refund linked to gateway");
        return Ok(WebhookOutcome::Applied);
    }

    // Gateway-initiated refunds skip the user request step.
    match gateway_initiated_request(tx, &refund, RefundStatus::Approved).await? {
        Some(request) => {
            info!(refund_id = %request.id, gateway_refund_id = %refund.id, "Gateway-initiated refund recorded");
            Ok(WebhookOutcome::Applied)
        }
        None => Ok(WebhookOutcome::Skipped("no matching payment")),
    }
}

async fn refund_processed(
    tx: &mut dyn LedgerTx,
    refund: RefundEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let request = match tx.refund_by_gateway_refund_id(&refund.id).await? {
        Some(r) => Some(r),
        None => tx.open_refund_for_payment(&refund.payment_id).await?,
    };

    let mut request = match request {
        Some(r) => r,
        None => {
            // Processed arrived before created: record it directly.
            match gateway_initiated_request(tx, &refund, RefundStatus::Approved).await? {
                Some(r) => r,
                None => return Ok(WebhookOutcome::Skipped("no matching payment")),
            }
        }
    };

    if request.status == RefundStatus::Pending {
        request.status = RefundStatus::Approved;
    }
    if !request.status.can_transition_to(RefundStatus::Processed) {
        return Ok(WebhookOutcome::Skipped("refund not awaiting processing"));
    }

    request.mark_processed(Some(&refund.id), None, now);
    tx.save_refund(&request).await?;
    apply_processed_refund(tx, &request, now).await?;

    info!(refund_id = %request.id, gateway_refund_id = %refund.id, "Refund processed");
    Ok(WebhookOutcome::Applied)
}

async fn refund_failed(
    tx: &mut dyn LedgerTx,
    refund: RefundEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let request = match tx.refund_by_gateway_refund_id(&refund.id).await? {
        Some(r) => Some(r),
        None => tx.open_refund_for_payment(&refund.payment_id).await?,
    };
    let Some(mut request) = request else {
        return Ok(WebhookOutcome::Skipped("no matching refund request"));
    };
    if !request.status.can_transition_to(RefundStatus::Rejected) {
        return Ok(WebhookOutcome::Skipped("refund already final"));
    }

    request.status = RefundStatus::Rejected;
    request.processing_started_at = None;
    request.gateway_refund_id.get_or_insert(refund.id.clone());
    request.add_note(&format!(
        "Gateway refund {} failed{}",
        refund.id,
        refund
            .status
            .as_deref()
            .map(|s| format!(" (status {s})"))
            .unwrap_or_default()
    ));
    request.updated_at = now;
    tx.save_refund(&request).await?;
    Ok(WebhookOutcome::Applied)
}

async fn pause_subscription(
    tx: &mut dyn LedgerTx,
    entity: &SubscriptionEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let Some(mut subscription) = find_subscription(tx, entity, now).await? else {
        return Ok(WebhookOutcome::Skipped("no matching subscription"));
    };
    if !subscription.status.grants_access() {
        return Ok(WebhookOutcome::Skipped("subscription not active"));
    }
    subscription.status = SubscriptionStatus::Paused;
    subscription.updated_at = now;
    tx.save_subscription(&subscription).await?;
    info!(subscription_id = %subscription.id, "Subscription paused after billing failure");
    Ok(WebhookOutcome::Applied)
}

async fn end_subscription(
    tx: &mut dyn LedgerTx,
    entity: &SubscriptionEntity,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let Some(mut subscription) = find_subscription(tx, entity, now).await? else {
        return Ok(WebhookOutcome::Skipped("no matching subscription"));
    };
    if subscription.status.is_terminal() {
        return Ok(WebhookOutcome::Skipped("subscription already ended"));
    }
    subscription.status = status;
    if status == SubscriptionStatus::Cancelled {
        subscription.cancelled_at.get_or_insert(now);
    }
    subscription.pending_plan_id = None;
    subscription.updated_at = now;
    tx.save_subscription(&subscription).await?;
    info!(subscription_id = %subscription.id, status = %status, "Subscription ended by gateway");
    Ok(WebhookOutcome::Applied)
}

async fn invoice_expired(
    tx: &mut dyn LedgerTx,
    invoice: &InvoiceEntity,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let Some(gateway_subscription_id) = &invoice.subscription_id else {
        return Ok(WebhookOutcome::Skipped("invoice not linked to a subscription"));
    };
    let Some(mut subscription) = tx.subscription_by_gateway_id(gateway_subscription_id).await?
    else {
        return Ok(WebhookOutcome::Skipped("no matching subscription"));
    };
    if !subscription.status.grants_access() {
        return Ok(WebhookOutcome::Skipped("subscription not active"));
    }
    subscription.status = SubscriptionStatus::Paused;
    subscription.updated_at = now;
    tx.save_subscription(&subscription).await?;
    info!(subscription_id = %subscription.id, invoice_id = %invoice.id, "Subscription paused, invoice expired");
    Ok(WebhookOutcome::Applied)
}

/// Looks a subscription up by gateway id, falling back to the ledger id the
/// checkout put in the notes. A fallback hit links the gateway id for next time.
async fn find_subscription(
    tx: &mut dyn LedgerTx,
    entity: &SubscriptionEntity,
    now: DateTime<Utc>,
) -> AppResult<Option<Subscription>> {
    if let Some(subscription) = tx.subscription_by_gateway_id(&entity.id).await? {
        return Ok(Some(subscription));
    }

    let Some(ledger_id) = note(&entity.notes, "subscription_id").and_then(|s| Uuid::parse_str(s).ok())
    else {
        return Ok(None);
    };
    let Some(mut subscription) = tx.subscription_by_id(ledger_id).await? else {
        return Ok(None);
    };
    if subscription.gateway_subscription_id.is_none() {
        subscription.gateway_subscription_id = Some(entity.id.clone());
        subscription.updated_at = now;
        tx.save_subscription(&subscription).await?;
    }
    Ok(Some(subscription))
}

/// Creates a request for a refund the gateway issued on its own.
async fn gateway_initiated_request(
    tx: &mut dyn LedgerTx,
    refund: &RefundEntity,
    status: RefundStatus,
) -> AppResult<Option<RefundRequest>> {
    let Some(payment) = tx.payment_by_gateway_payment_id(&refund.payment_id).await? else {
        warn!(gateway_payment_id = %refund.payment_id, "Refund for unknown payment");
        return Ok(None);
    };

    let (subscription_id, purchase_id) = match (payment.ref_type, payment.ref_id) {
        (Some(RefType::Subscription), Some(id)) => (Some(id), None),
        (Some(RefType::Purchase), Some(id)) => (None, Some(id)),
        _ => (None, None),
    };
    let amount = if refund.amount > 0 {
        from_minor_units(refund.amount)
    } else {
        payment.amount
    };

    let request = tx
        .insert_refund(&NewRefundRequest {
            user_id: payment.user_id,
            subscription_id,
            purchase_id,
            amount,
            currency: refund.currency.clone().unwrap_or(payment.currency),
            reason: note(&refund.notes, "reason")
                .unwrap_or("Refund issued by payment gateway")
                .to_string(),
            status,
            gateway_payment_id: Some(refund.payment_id.clone()),
            gateway_refund_id: Some(refund.id.clone()),
        })
        .await?;
    Ok(Some(request))
}
