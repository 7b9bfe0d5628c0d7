//! State transitions shared by the client verification path, the webhook
//! path and the refund workflow.
//!
//! Both reconciliation paths funnel a successful payment through
//! [`settle_payment`], so whichever arrives first wins and the other sees a
//! completed record and stops.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{catalog::CatalogRepo, ledger::LedgerTx},
    domain::{
        billing_period::advance_period,
        entities::{
            catalog::Plan,
            merch_order::MerchOrderStatus,
            payment_record::{
                NewPaymentRecord, PaymentMetadata, PaymentRecord, PaymentStatus, PaymentType,
                RefType,
            },
            purchase::PurchaseStatus,
            refund_request::RefundRequest,
            subscription::{NewSubscription, Subscription, SubscriptionStatus},
        },
    },
};

/// Gateway identifiers attached to a settled payment.
#[derive(Debug, Clone, Default)]
pub struct GatewayRefs {
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
}

/// Marks `payment` completed and applies its effect on the entity it pays for.
///
/// Returns the subscription that now grants access when the payment was for one.
/// The caller must have checked that the payment is in a status that accepts
/// settlement.
pub async fn settle_payment(
    tx: &mut dyn LedgerTx,
    catalog: &dyn CatalogRepo,
    payment: &mut PaymentRecord,
    gateway_payment_id: &str,
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Option<Subscription>> {
    payment.status = PaymentStatus::Completed;
    payment.gateway_payment_id = Some(gateway_payment_id.to_string());
    if let Some(signature) = signature {
        payment.gateway_signature = Some(signature.to_string());
    }
    payment.metadata.failure_reason = None;
    payment.updated_at = now;

    let refs = GatewayRefs {
        order_id: payment.gateway_order_id.clone(),
        payment_id: Some(gateway_payment_id.to_string()),
    };

    let subscription = match payment.payment_type {
        PaymentType::Purchase | PaymentType::Playlist => {
            complete_purchase(tx, payment, &refs, signature, now).await?;
            None
        }
        PaymentType::Merch => {
            complete_merch_order(tx, payment, &refs, now).await?;
            None
        }
        PaymentType::Subscription => {
            let plan = plan_for_payment(catalog, payment).await?;
            let subscription = activate_subscription(tx, payment.user_id, &plan, refs, now).await?;
            payment.ref_type = Some(RefType::Subscription);
            payment.ref_id = Some(subscription.id);
            Some(subscription)
        }
        PaymentType::SubscriptionUpgrade => {
            let plan = plan_for_payment(catalog, payment).await?;
            let current = match payment.ref_id {
                Some(id) => tx.subscription_by_id(id).await?,
                None => None,
            };
            let subscription = match current {
                Some(current) if current.status.grants_access() => {
                    upgrade_in_place(tx, current, &plan, refs, now).await?
                }
                _ => {
                    warn!(
                        payment_id = %payment.id,
                        "Upgraded subscription no longer grants access, activating a new one"
                    );
                    activate_subscription(tx, payment.user_id, &plan, refs, now).await?
                }
            };
            payment.ref_type = Some(RefType::Subscription);
            payment.ref_id = Some(subscription.id);
            Some(subscription)
        }
        PaymentType::SubscriptionRenewal | PaymentType::Refund => {
            return Err(AppError::InvalidState(format!(
                "{} payments are not settled through an order",
                payment.payment_type.as_str()
            )));
        }
    };

    tx.save_payment(payment).await?;

    info!(
        payment_id = %payment.id,
        gateway_payment_id = %gateway_payment_id,
        payment_type = payment.payment_type.as_str(),
        user_id = %payment.user_id,
        "Payment settled"
    );

    Ok(subscription)
}

/// Marks a pending payment failed along with the purchase or merch order it was for.
pub async fn fail_payment(
    tx: &mut dyn LedgerTx,
    payment: &mut PaymentRecord,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    payment.status = PaymentStatus::Failed;
    payment.metadata.failure_reason = Some(reason.to_string());
    payment.updated_at = now;
    tx.save_payment(payment).await?;

    match (payment.ref_type, payment.ref_id) {
        (Some(RefType::Purchase), Some(id)) => {
            if let Some(mut purchase) = tx.purchase_by_id(id).await?
                && purchase.status == PurchaseStatus::Pending
            {
                purchase.status = PurchaseStatus::Failed;
                purchase.updated_at = now;
                tx.save_purchase(&purchase).await?;
            }
        }
        (Some(RefType::MerchOrder), Some(id)) => {
            if let Some(mut order) = tx.merch_order_by_id(id).await?
                && order.status == MerchOrderStatus::Pending
            {
                order.status = MerchOrderStatus::Failed;
                order.updated_at = now;
                tx.save_merch_order(&order).await?;
            }
        }
        _ => {}
    }

    info!(payment_id = %payment.id, reason = %reason, "Payment marked failed");
    Ok(())
}

/// Supersedes every access-granting subscription of the user and inserts a
/// fresh active one on `plan`, all inside the caller's transaction.
pub async fn activate_subscription(
    tx: &mut dyn LedgerTx,
    user_id: Uuid,
    plan: &Plan,
    refs: GatewayRefs,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    supersede_granting(tx, user_id, None, now).await?;

    let subscription = tx
        .insert_subscription(&NewSubscription {
            user_id,
            plan_id: plan.id,
            amount: plan.price,
            currency: plan.currency.clone(),
            interval: plan.interval,
            current_period_start: now,
            current_period_end: advance_period(now, plan.interval),
            gateway_order_id: refs.order_id,
            gateway_payment_id: refs.payment_id,
        })
        .await?;

    info!(
        subscription_id = %subscription.id,
        user_id = %user_id,
        plan_id = %plan.id,
        "Subscription activated"
    );
    Ok(subscription)
}

/// Moves an existing subscription onto `plan` and restarts its period at `now`.
pub async fn upgrade_in_place(
    tx: &mut dyn LedgerTx,
    mut subscription: Subscription,
    plan: &Plan,
    refs: GatewayRefs,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    supersede_granting(tx, subscription.user_id, Some(subscription.id), now).await?;

    let previous_plan_id = subscription.plan_id;
    subscription.plan_id = plan.id;
    subscription.amount = plan.price;
    subscription.currency = plan.currency.clone();
    subscription.interval = plan.interval;
    subscription.status = SubscriptionStatus::Active;
    subscription.pending_plan_id = None;
    subscription.cancel_at_period_end = false;
    subscription.current_period_start = now;
    subscription.current_period_end = advance_period(now, plan.interval);
    if refs.order_id.is_some() {
        subscription.gateway_order_id = refs.order_id;
    }
    if refs.payment_id.is_some() {
        subscription.gateway_payment_id = refs.payment_id;
    }
    subscription.updated_at = now;
    tx.save_subscription(&subscription).await?;

    info!(
        subscription_id = %subscription.id,
        from_plan = %previous_plan_id,
        to_plan = %plan.id,
        "Subscription upgraded"
    );
    Ok(subscription)
}

async fn supersede_granting(
    tx: &mut dyn LedgerTx,
    user_id: Uuid,
    keep: Option<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    for mut other in tx.granting_subscriptions(user_id).await? {
        if Some(other.id) == keep {
            continue;
        }
        other.supersede(now);
        tx.save_subscription(&other).await?;
        info!(subscription_id = %other.id, user_id = %user_id, "Subscription superseded");
    }
    Ok(())
}

async fn plan_for_payment(catalog: &dyn CatalogRepo, payment: &PaymentRecord) -> AppResult<Plan> {
    let plan_id = payment.metadata.target_id.ok_or_else(|| {
        AppError::Internal(format!("Payment {} has no target plan recorded", payment.id))
    })?;
    // Inactive plans are still honoured: the money has already moved.
    catalog.plan(plan_id).await?.ok_or(AppError::NotFound)
}

async fn complete_purchase(
    tx: &mut dyn LedgerTx,
    payment: &PaymentRecord,
    refs: &GatewayRefs,
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let purchase = match (payment.ref_type, payment.ref_id) {
        (Some(RefType::Purchase), Some(id)) => tx.purchase_by_id(id).await?,
        _ => match &payment.gateway_order_id {
            Some(order_id) => tx.purchase_by_order_id(order_id).await?,
            None => None,
        },
    };
    let Some(mut purchase) = purchase else {
        warn!(payment_id = %payment.id, "No purchase row linked to payment");
        return Ok(());
    };

    if !matches!(purchase.status, PurchaseStatus::Pending | PurchaseStatus::Failed) {
        return Ok(());
    }

    if let Some(existing) = tx
        .completed_purchase(purchase.user_id, purchase.content_kind, purchase.content_id)
        .await?
        && existing.id != purchase.id
    {
        warn!(
            purchase_id = %purchase.id,
            existing_purchase_id = %existing.id,
            "Content already owned, duplicate payment needs a refund"
        );
        return Ok(());
    }

    purchase.status = PurchaseStatus::Completed;
    purchase.gateway_payment_id = refs.payment_id.clone();
    if let Some(signature) = signature {
        purchase.gateway_signature = Some(signature.to_string());
    }
    purchase.updated_at = now;
    tx.save_purchase(&purchase).await
}

async fn complete_merch_order(
    tx: &mut dyn LedgerTx,
    payment: &PaymentRecord,
    refs: &GatewayRefs,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let order = match (payment.ref_type, payment.ref_id) {
        (Some(RefType::MerchOrder), Some(id)) => tx.merch_order_by_id(id).await?,
        _ => None,
    };
    let Some(mut order) = order else {
        warn!(payment_id = %payment.id, "No merch order linked to payment");
        return Ok(());
    };

    if matches!(
        order.status,
        MerchOrderStatus::Pending | MerchOrderStatus::Failed
    ) {
        order.status = MerchOrderStatus::Completed;
        order.gateway_payment_id = refs.payment_id.clone();
        order.updated_at = now;
        tx.save_merch_order(&order).await?;
    }
    Ok(())
}

/// Records a processed refund: cascades to the refunded entities, flips the
/// original payment to refunded and appends a refund entry to the history.
///
/// `refund` must already be in its processed state.
pub async fn apply_processed_refund(
    tx: &mut dyn LedgerTx,
    refund: &RefundRequest,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let original = match &refund.gateway_payment_id {
        Some(payment_id) => tx.payment_by_gateway_payment_id(payment_id).await?,
        None => None,
    };

    let mut subscription_id = refund.subscription_id;
    let mut purchase_id = refund.purchase_id;
    let mut merch_order_id = None;

    if let Some(mut payment) = original {
        match (payment.ref_type, payment.ref_id) {
            (Some(RefType::Subscription), Some(id)) => {
                subscription_id.get_or_insert(id);
            }
            (Some(RefType::Purchase), Some(id)) => {
                purchase_id.get_or_insert(id);
            }
            (Some(RefType::MerchOrder), Some(id)) => merch_order_id = Some(id),
            _ => {}
        }
        if payment.status == PaymentStatus::Completed {
            payment.status = PaymentStatus::Refunded;
            payment.updated_at = now;
            tx.save_payment(&payment).await?;
        }
    }

    if let Some(id) = subscription_id
        && let Some(mut subscription) = tx.subscription_by_id(id).await?
        && !subscription.status.is_terminal()
    {
        subscription.cancel(now);
        tx.save_subscription(&subscription).await?;
        info!(subscription_id = %id, refund_id = %refund.id, "Subscription cancelled by refund");
    }

    if let Some(id) = purchase_id
        && let Some(mut purchase) = tx.purchase_by_id(id).await?
        && purchase.status == PurchaseStatus::Completed
    {
        purchase.status = PurchaseStatus::Refunded;
        purchase.updated_at = now;
        tx.save_purchase(&purchase).await?;
        info!(purchase_id = %id, refund_id = %refund.id, "Purchase refunded");
    }

    if let Some(id) = merch_order_id
        && let Some(mut order) = tx.merch_order_by_id(id).await?
        && order.status == MerchOrderStatus::Completed
    {
        order.status = MerchOrderStatus::Refunded;
        order.updated_at = now;
        tx.save_merch_order(&order).await?;
        info!(merch_order_id = %id, refund_id = %refund.id, "Merch order refunded");
    }

    let (ref_type, ref_id) = match (subscription_id, purchase_id, merch_order_id) {
        (Some(id), _, _) => (Some(RefType::Subscription), Some(id)),
        (None, Some(id), _) => (Some(RefType::Purchase), Some(id)),
        (None, None, Some(id)) => (Some(RefType::MerchOrder), Some(id)),
        _ => (None, None),
    };

    tx.insert_payment(&NewPaymentRecord {
        user_id: refund.user_id,
        payment_type: PaymentType::Refund,
        amount: refund.amount,
        currency: refund.currency.clone(),
        status: PaymentStatus::Completed,
        gateway_order_id: None,
        gateway_payment_id: refund.gateway_payment_id.clone(),
        metadata: PaymentMetadata {
            refund_request_id: Some(refund.id),
            gateway_refund_id: refund.gateway_refund_id.clone(),
            ..Default::default()
        },
        ref_type,
        ref_id,
    })
    .await?;

    Ok(())
}

/// Zero-amount completed entry for transitions applied without a charge.
pub fn free_transition_record(
    user_id: Uuid,
    payment_type: PaymentType,
    currency: &str,
    subscription_id: Uuid,
    metadata: PaymentMetadata,
) -> NewPaymentRecord {
    NewPaymentRecord {
        user_id,
        payment_type,
        amount: Decimal::ZERO,
        currency: currency.to_string(),
        status: PaymentStatus::Completed,
        gateway_order_id: None,
        gateway_payment_id: None,
        metadata,
        ref_type: Some(RefType::Subscription),
        ref_id: Some(subscription_id),
    }
}
