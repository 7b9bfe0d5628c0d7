//! Order creation: prices an intent, opens a gateway order and writes the
//! pending ledger rows the verifier and the webhook reconciler later settle.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            catalog::CatalogRepo,
            ledger::{LedgerStore, LedgerTx},
            payment_gateway::{CreateOrderRequest, GatewayOrder, PaymentGatewayPort},
        },
        use_cases::settlement::{
            GatewayRefs, activate_subscription, free_transition_record, upgrade_in_place,
        },
    },
    domain::{
        billing_period::compute_upgrade_charge,
        entities::{
            catalog::{ContentKind, Plan},
            merch_order::NewMerchOrder,
            order_intent::OrderIntent,
            payment_record::{NewPaymentRecord, PaymentMetadata, PaymentStatus, PaymentType, RefType},
            purchase::NewPurchase,
            subscription::{Subscription, SubscriptionStatus},
        },
        money::to_minor_units,
    },
};

pub const MAX_MERCH_QUANTITY: i32 = 10;

// ============================================================================
// Input / Output Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub intent: OrderIntent,
    pub target_id: Uuid,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
}

/// What the checkout client needs to open the gateway's payment sheet.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDescriptor {
    pub order_id: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: String,
    pub payment_id: Uuid,
    pub intent: OrderIntent,
    pub target_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    PaymentRequired { order: OrderDescriptor },
    /// Applied without a charge (free plan, zero-cost upgrade).
    Applied { subscription: Subscription },
    /// Downgrade scheduled for the next period boundary.
    Scheduled { subscription: Subscription },
}

/// Priced, validated intent waiting for a gateway order.
struct PricedOrder {
    intent: OrderIntent,
    target_id: Uuid,
    amount: Decimal,
    currency: String,
    metadata: PaymentMetadata,
    pending: PendingRow,
}

enum PendingRow {
    Purchase(ContentKind),
    Merch {
        quantity: i32,
        shipping_address: Option<serde_json::Value>,
    },
    NewSubscription,
    Upgrade {
        subscription_id: Uuid,
    },
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct OrderUseCases {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogRepo>,
    gateway: Arc<dyn PaymentGatewayPort>,
}

impl OrderUseCases {
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

    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> AppResult<OrderOutcome> {
        let priced = match input.intent {
            OrderIntent::Purchase => {
                self.price_content(user_id, ContentKind::Content, input.target_id)
                    .await?
            }
            OrderIntent::Playlist => {
                self.price_content(user_id, ContentKind::Playlist, input.target_id)
                    .await?
            }
            OrderIntent::Merch => {
                self.price_merch(input.target_id, input.quantity, input.shipping_address)
                    .await?
            }
            OrderIntent::SubscriptionNew => {
                match self.start_subscription(user_id, input.target_id).await? {
                    Ok(priced) => priced,
                    Err(applied) => return Ok(applied),
                }
            }
            OrderIntent::SubscriptionUpgrade => {
                match self.price_upgrade(user_id, input.target_id).await? {
                    Ok(priced) => priced,
                    Err(applied) => return Ok(applied),
                }
            }
            OrderIntent::SubscriptionDowngrade => {
                let subscription = self.schedule_downgrade(user_id, input.target_id).await?;
                return Ok(OrderOutcome::Scheduled { subscription });
            }
        };

        if priced.amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "Computed charge {} must be positive",
                priced.amount
            )));
        }

        // Nothing is written until the gateway has produced an order id, so a
        // timeout here leaves no pending row behind.
        let order = self.open_gateway_order(user_id, &priced).await?;
        let payment_id = self.record_pending(user_id, &priced, &order).await?;

        info!(
            user_id = %user_id,
            intent = priced.intent.as_str(),
            order_id = %order.id,
            amount = %priced.amount,
            "Order created"
        );

        Ok(OrderOutcome::PaymentRequired {
            order: OrderDescriptor {
                order_id: order.id,
                amount: priced.amount,
                amount_minor: order.amount_minor,
                currency: order.currency,
                key_id: self.gateway.key_id().to_string(),
                payment_id,
                intent: priced.intent,
                target_id: priced.target_id,
            },
        })
    }

    /// Sets the pending plan on the user's subscription. Calling it again with
    /// the same plan is a no-op; with another plan it replaces the schedule.
    pub async fn schedule_downgrade(&self, user_id: Uuid, plan_id: Uuid) -> AppResult<Subscription> {
        let plan = self.active_plan(plan_id).await?;

        let mut tx = self.ledger.begin().await?;
        let mut subscription = current_subscription(tx.as_mut(), user_id).await?;

        if subscription.status == SubscriptionStatus::PendingDowngrade
            && subscription.pending_plan_id == Some(plan.id)
        {
            return Ok(subscription);
        }
        if subscription.plan_id == plan.id {
            return Err(AppError::InvalidState("Already on this plan".into()));
        }
        if plan.price >= subscription.amount {
            return Err(AppError::InvalidState(
                "Target plan is not cheaper than the current plan".into(),
            ));
        }

        subscription.pending_plan_id = Some(plan.id);
        subscription.status = SubscriptionStatus::PendingDowngrade;
        subscription.cancel_at_period_end = false;
        subscription.updated_at = Utc::now();
        tx.save_subscription(&subscription).await?;
        tx.commit().await?;

        info!(
            subscription_id = %subscription.id,
            pending_plan_id = %plan.id,
            effective_at = %subscription.current_period_end,
            "Downgrade scheduled"
        );
        Ok(subscription)
    }

    async fn price_content(
        &self,
        user_id: Uuid,
        kind: ContentKind,
        content_id: Uuid,
    ) -> AppResult<PricedOrder> {
        let content = self
            .catalog
            .content(kind, content_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound)?;

        if content.is_free || content.price <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "{} is free and cannot be purchased",
                content.title
            )));
        }

        let mut tx = self.ledger.begin().await?;
        if tx
            .completed_purchase(user_id, kind, content_id)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidState(format!(
                "{} already purchased",
                kind.as_str()
            )));
        }
        drop(tx);

        let intent = match kind {
            ContentKind::Content => OrderIntent::Purchase,
            ContentKind::Playlist => OrderIntent::Playlist,
        };
        Ok(PricedOrder {
            intent,
            target_id: content_id,
            amount: content.price,
            currency: content.currency,
            metadata: PaymentMetadata {
                intent: Some(intent),
                target_id: Some(content_id),
                ..Default::default()
            },
            pending: PendingRow::Purchase(kind),
        })
    }

    async fn price_merch(
        &self,
        item_id: Uuid,
        quantity: Option<i32>,
        shipping_address: Option<serde_json::Value>,
    ) -> AppResult<PricedOrder> {
        let quantity = quantity.unwrap_or(1);
        if !(1..=MAX_MERCH_QUANTITY).contains(&quantity) {
            return Err(AppError::InvalidInput(format!(
                "Quantity must be between 1 and {MAX_MERCH_QUANTITY}"
            )));
        }

        let item = self
            .catalog
            .merch_item(item_id)
            .await?
            .filter(|i| i.is_active)
            .ok_or(AppError::NotFound)?;

        if item.stock < quantity {
            return Err(AppError::InvalidState(format!(
                "Only {} of {} left in stock",
                item.stock, item.name
            )));
        }

        Ok(PricedOrder {
            intent: OrderIntent::Merch,
            target_id: item_id,
            amount: item.price * Decimal::from(quantity),
            currency: item.currency,
            metadata: PaymentMetadata {
                intent: Some(OrderIntent::Merch),
                target_id: Some(item_id),
                quantity: Some(quantity),
                shipping_address: shipping_address.clone(),
                ..Default::default()
            },
            pending: PendingRow::Merch {
                quantity,
                shipping_address,
            },
        })
    }

    /// `Err(outcome)` carries a free-plan activation that needs no payment.
    async fn start_subscription(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> AppResult<Result<PricedOrder, OrderOutcome>> {
        let plan = self.active_plan(plan_id).await?;

        let mut tx = self.ledger.begin().await?;
        if !tx.granting_subscriptions(user_id).await?.is_empty() {
            return Err(AppError::InvalidState(
                "Already subscribed, change plans with an upgrade or downgrade".into(),
            ));
        }

        if plan.is_free() {
            let now = Utc::now();
            let subscription =
                activate_subscription(tx.as_mut(), user_id, &plan, GatewayRefs::default(), now)
                    .await?;
            tx.insert_payment(&free_transition_record(
                user_id,
                PaymentType::Subscription,
                &plan.currency,
                subscription.id,
                PaymentMetadata {
                    intent: Some(OrderIntent::SubscriptionNew),
                    target_id: Some(plan.id),
                    ..Default::default()
                },
            ))
            .await?;
            tx.commit().await?;
            return Ok(Err(OrderOutcome::Applied { subscription }));
        }
        drop(tx);

        Ok(Ok(PricedOrder {
            intent: OrderIntent::SubscriptionNew,
            target_id: plan.id,
            amount: plan.price,
            currency: plan.currency,
            metadata: PaymentMetadata {
                intent: Some(OrderIntent::SubscriptionNew),
                target_id: Some(plan.id),
                ..Default::default()
            },
            pending: PendingRow::NewSubscription,
        }))
    }

    /// `Err(outcome)` carries an upgrade whose prorated charge was zero.
    async fn price_upgrade(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> AppResult<Result<PricedOrder, OrderOutcome>> {
        let plan = self.active_plan(plan_id).await?;

        let mut tx = self.ledger.begin().await?;
        let subscription = current_subscription(tx.as_mut(), user_id).await?;

        if subscription.plan_id == plan.id {
            return Err(AppError::InvalidState("Already on this plan".into()));
        }
        if plan.price <= subscription.amount {
            return Err(AppError::InvalidState(
                "Target plan is not more expensive than the current plan".into(),
            ));
        }

        let now = Utc::now();
        let charge = compute_upgrade_charge(
            subscription.amount,
            plan.price,
            subscription.current_period_start,
            subscription.current_period_end,
            now,
        );
        let metadata = PaymentMetadata {
            intent: Some(OrderIntent::SubscriptionUpgrade),
            target_id: Some(plan.id),
            previous_plan_id: Some(subscription.plan_id),
            proration_credit: Some(charge.credit),
            ..Default::default()
        };

        if charge.is_free() {
            let subscription_id = subscription.id;
            let upgraded =
                upgrade_in_place(tx.as_mut(), subscription, &plan, GatewayRefs::default(), now)
                    .await?;
            tx.insert_payment(&free_transition_record(
                user_id,
                PaymentType::SubscriptionUpgrade,
                &plan.currency,
                subscription_id,
                metadata,
            ))
            .await?;
            tx.commit().await?;
            return Ok(Err(OrderOutcome::Applied {
                subscription: upgraded,
            }));
        }
        drop(tx);

        Ok(Ok(PricedOrder {
            intent: OrderIntent::SubscriptionUpgrade,
            target_id: plan.id,
            amount: charge.amount_to_pay,
            currency: plan.currency,
            metadata,
            pending: PendingRow::Upgrade {
                subscription_id: subscription.id,
            },
        }))
    }

    async fn active_plan(&self, plan_id: Uuid) -> AppResult<Plan> {
        self.catalog
            .plan(plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::NotFound)
    }

    async fn open_gateway_order(
        &self,
        user_id: Uuid,
        priced: &PricedOrder,
    ) -> AppResult<GatewayOrder> {
        let mut notes = BTreeMap::new();
        notes.insert("user_id".to_string(), user_id.to_string());
        notes.insert("intent".to_string(), priced.intent.as_str().to_string());
        notes.insert("target_id".to_string(), priced.target_id.to_string());
        if let Some(previous) = priced.metadata.previous_plan_id {
            notes.insert("previous_plan_id".to_string(), previous.to_string());
        }

        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        self.gateway
            .create_order(CreateOrderRequest {
                amount_minor: to_minor_units(priced.amount)?,
                currency: priced.currency.clone(),
                receipt,
                notes,
            })
            .await
    }

    async fn record_pending(
        &self,
        user_id: Uuid,
        priced: &PricedOrder,
        order: &GatewayOrder,
    ) -> AppResult<Uuid> {
        let mut tx = self.ledger.begin().await?;

        let (ref_type, ref_id) = match &priced.pending {
            PendingRow::Purchase(kind) => {
                let purchase = tx
                    .insert_purchase(&NewPurchase {
                        user_id,
                        content_kind: *kind,
                        content_id: priced.target_id,
                        amount: priced.amount,
                        currency: priced.currency.clone(),
                        gateway_order_id: order.id.clone(),
                    })
                    .await?;
                (Some(RefType::Purchase), Some(purchase.id))
            }
            PendingRow::Merch {
                quantity,
                shipping_address,
            } => {
                let merch = tx
                    .insert_merch_order(&NewMerchOrder {
                        user_id,
                        merch_item_id: priced.target_id,
                        quantity: *quantity,
                        amount: priced.amount,
                        currency: priced.currency.clone(),
                        shipping_address: shipping_address.clone(),
                        gateway_order_id: order.id.clone(),
                    })
                    .await?;
                (Some(RefType::MerchOrder), Some(merch.id))
            }
            PendingRow::NewSubscription => (None, None),
            PendingRow::Upgrade { subscription_id } => {
                (Some(RefType::Subscription), Some(*subscription_id))
            }
        };

        let payment = tx
            .insert_payment(&NewPaymentRecord {
                user_id,
                payment_type: PaymentType::for_intent(priced.intent),
                amount: priced.amount,
                currency: priced.currency.clone(),
                status: PaymentStatus::Pending,
                gateway_order_id: Some(order.id.clone()),
                gateway_payment_id: None,
                metadata: priced.metadata.clone(),
                ref_type,
                ref_id,
            })
            .await?;
        tx.commit().await?;

        Ok(payment.id)
    }
}

/// The single access-granting subscription of a user.
pub(crate) async fn current_subscription(
    tx: &mut dyn LedgerTx,
    user_id: Uuid,
) -> AppResult<Subscription> {
    tx.granting_subscriptions(user_id)
        .await?
        .into_iter()
        .max_by_key(|s| s.created_at)
        .ok_or_else(|| AppError::InvalidState("No active subscription".into()))
}
