//! In-memory ledger and catalog.
//!
//! `InMemoryLedger::begin` takes the whole-ledger lock and hands out a working
//! copy; `commit` writes it back, dropping discards it. That gives tests the
//! same all-or-nothing and serialized behaviour the Postgres transactions have.
//! The unique indexes of the schema are checked on every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        catalog::CatalogRepo,
        ledger::{LedgerStore, LedgerTx},
    },
    domain::entities::{
        catalog::{ContentItem, ContentKind, MerchItem, Plan},
        merch_order::{MerchOrder, MerchOrderStatus, NewMerchOrder},
        payment_record::{NewPaymentRecord, PaymentRecord, PaymentType},
        purchase::{NewPurchase, Purchase, PurchaseStatus},
        refund_request::{NewRefundRequest, RefundRequest, RefundStatus, RefundTarget},
        subscription::{NewSubscription, Subscription, SubscriptionStatus},
    },
};

// ============================================================================
// LedgerState
// ============================================================================

#[derive(Debug, Clone)]
pub struct WebhookEventRow {
    pub event_type: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pub subscriptions: HashMap<Uuid, Subscription>,
    pub purchases: HashMap<Uuid, Purchase>,
    pub merch_orders: HashMap<Uuid, MerchOrder>,
    pub payments: HashMap<Uuid, PaymentRecord>,
    pub refunds: HashMap<Uuid, RefundRequest>,
    pub webhook_events: HashMap<String, WebhookEventRow>,
}

impl LedgerState {
    pub fn granting_for(&self, user_id: Uuid) -> Vec<&Subscription> {
        self.subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.status.grants_access())
            .collect()
    }

    pub fn payments_for(&self, user_id: Uuid) -> Vec<&PaymentRecord> {
        self.payments
            .values()
            .filter(|p| p.user_id == user_id)
            .collect()
    }

    pub fn payment_by_order(&self, order_id: &str) -> Option<&PaymentRecord> {
        self.payments
            .values()
            .find(|p| p.gateway_order_id.as_deref() == Some(order_id))
    }

    pub fn refunds_for(&self, user_id: Uuid) -> Vec<&RefundRequest> {
        self.refunds
            .values()
            .filter(|r| r.user_id == user_id)
            .collect()
    }

    fn check_subscription(&self, subscription: &Subscription) -> AppResult<()> {
        let clash = self.subscriptions.values().any(|other| {
            other.id != subscription.id
                && ((subscription.status.grants_access()
                    && other.user_id == subscription.user_id
                    && other.status.grants_access())
                    || (subscription.gateway_subscription_id.is_some()
                        && other.gateway_subscription_id == subscription.gateway_subscription_id))
        });
        if clash { Err(conflict("subscriptions")) } else { Ok(()) }
    }

    fn check_purchase(&self, purchase: &Purchase) -> AppResult<()> {
        let clash = self.purchases.values().any(|other| {
            other.id != purchase.id
                && ((purchase.gateway_order_id.is_some()
                    && other.gateway_order_id == purchase.gateway_order_id)
                    || (purchase.status == PurchaseStatus::Completed
                        && other.status == PurchaseStatus::Completed
                        && other.user_id == purchase.user_id
                        && other.content_kind == purchase.content_kind
                        && other.content_id == purchase.content_id))
        });
        if clash { Err(conflict("purchases")) } else { Ok(()) }
    }

    fn check_payment(&self, payment: &PaymentRecord) -> AppResult<()> {
        let clash = self.payments.values().any(|other| {
            other.id != payment.id
                && ((payment.gateway_order_id.is_some()
                    && other.gateway_order_id == payment.gateway_order_id)
                    || (payment.gateway_payment_id.is_some()
                        && payment.payment_type != PaymentType::Refund
                        && other.payment_type != PaymentType::Refund
                        && other.gateway_payment_id == payment.gateway_payment_id))
        });
        if clash { Err(conflict("payment_history")) } else { Ok(()) }
    }

    fn check_refund(&self, refund: &RefundRequest) -> AppResult<()> {
        let clash = self.refunds.values().any(|other| {
            let same_target = (refund.subscription_id.is_some()
                && other.subscription_id == refund.subscription_id)
                || (refund.purchase_id.is_some() && other.purchase_id == refund.purchase_id);
            other.id != refund.id
                && ((refund.gateway_refund_id.is_some()
                    && other.gateway_refund_id == refund.gateway_refund_id)
                    || (refund.status == RefundStatus::Pending
                        && other.status == RefundStatus::Pending
                        && same_target))
        });
        if clash { Err(conflict("refund_requests")) } else { Ok(()) }
    }
}

fn conflict(table: &str) -> AppError {
    AppError::InvalidState(format!("Conflicting concurrent update on {table}, retry"))
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    rows
}

// ============================================================================
// InMemoryLedger
// ============================================================================

#[derive(Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn seed(self, f: impl FnOnce(&mut LedgerState)) -> Self {
        {
            let mut state = self
                .state
                .try_lock()
                .expect("ledger is not shared while seeding");
            f(&mut state);
        }
        self
    }

    pub fn with_subscriptions(self, subscriptions: Vec<Subscription>) -> Self {
        self.seed(|s| {
            s.subscriptions
                .extend(subscriptions.into_iter().map(|x| (x.id, x)))
        })
    }

    pub fn with_purchases(self, purchases: Vec<Purchase>) -> Self {
        self.seed(|s| s.purchases.extend(purchases.into_iter().map(|x| (x.id, x))))
    }

    pub fn with_merch_orders(self, orders: Vec<MerchOrder>) -> Self {
        self.seed(|s| s.merch_orders.extend(orders.into_iter().map(|x| (x.id, x))))
    }

    pub fn with_payments(self, payments: Vec<PaymentRecord>) -> Self {
        self.seed(|s| s.payments.extend(payments.into_iter().map(|x| (x.id, x))))
    }

    pub fn with_refunds(self, refunds: Vec<RefundRequest>) -> Self {
        self.seed(|s| s.refunds.extend(refunds.into_iter().map(|x| (x.id, x))))
    }

    /// Committed state as other transactions would see it.
    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryLedgerTx { guard, working }))
    }
}

pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn subscription_by_id(&mut self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.working.subscriptions.get(&id).cloned())
    }

    async fn subscription_by_gateway_id(
        &mut self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .values()
            .find(|s| s.gateway_subscription_id.as_deref() == Some(gateway_subscription_id))
            .cloned())
    }

    async fn granting_subscriptions(&mut self, user_id: Uuid) -> AppResult<Vec<Subscription>> {
        let rows = self
            .working
            .granting_for(user_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(newest_first(rows, |s: &Subscription| s.created_at))
    }

    async fn subscriptions_due_for_rollover(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|s| {
                s.gateway_subscription_id.is_none()
                    && s.status.grants_access()
                    && s.current_period_end <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| s.current_period_end);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription> {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            plan_id: input.plan_id,
            status: SubscriptionStatus::Active,
            amount: input.amount,
            currency: input.currency.clone(),
            interval: input.interval,
            current_period_start: input.current_period_start,
            current_period_end: input.current_period_end,
            pending_plan_id: None,
            cancel_at_period_end: false,
            cancelled_at: None,
            gateway_order_id: input.gateway_order_id.clone(),
            gateway_payment_id: input.gateway_payment_id.clone(),
            gateway_subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        self.working.check_subscription(&subscription)?;
        self.working
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()> {
        if !self.working.subscriptions.contains_key(&subscription.id) {
            return Err(AppError::NotFound);
        }
        self.working.check_subscription(subscription)?;
        self.working
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn purchase_by_id(&mut self, id: Uuid) -> AppResult<Option<Purchase>> {
        Ok(self.working.purchases.get(&id).cloned())
    }

    async fn purchase_by_order_id(
        &mut self,
        gateway_order_id: &str,
    ) -> AppResult<Option<Purchase>> {
        Ok(self
            .working
            .purchases
            .values()
            .find(|p| p.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn completed_purchase(
        &mut self,
        user_id: Uuid,
        kind: ContentKind,
        content_id: Uuid,
    ) -> AppResult<Option<Purchase>> {
        Ok(self
            .working
            .purchases
            .values()
            .find(|p| {
                p.user_id == user_id
                    && p.content_kind == kind
                    && p.content_id == content_id
                    && p.status == PurchaseStatus::Completed
            })
            .cloned())
    }

    async fn insert_purchase(&mut self, input: &NewPurchase) -> AppResult<Purchase> {
        let now = Utc::now();
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            content_kind: input.content_kind,
            content_id: input.content_id,
            amount: input.amount,
            currency: input.currency.clone(),
            status: PurchaseStatus::Pending,
            gateway_order_id: Some(input.gateway_order_id.clone()),
            gateway_payment_id: None,
            gateway_signature: None,
            created_at: now,
            updated_at: now,
        };
        self.working.check_purchase(&purchase)?;
        self.working.purchases.insert(purchase.id, purchase.clone());
        Ok(purchase)
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> AppResult<()> {
        if !self.working.purchases.contains_key(&purchase.id) {
            return Err(AppError::NotFound);
        }
        self.working.check_purchase(purchase)?;
        self.working.purchases.insert(purchase.id, purchase.clone());
        Ok(())
    }

    async fn merch_order_by_id(&mut self, id: Uuid) -> AppResult<Option<MerchOrder>> {
        Ok(self.working.merch_orders.get(&id).cloned())
    }

    async fn insert_merch_order(&mut self, input: &NewMerchOrder) -> AppResult<MerchOrder> {
        let now = Utc::now();
        let order = MerchOrder {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            merch_item_id: input.merch_item_id,
            quantity: input.quantity,
            amount: input.amount,
            currency: input.currency.clone(),
            status: MerchOrderStatus::Pending,
            shipping_address: input.shipping_address.clone(),
            gateway_order_id: Some(input.gateway_order_id.clone()),
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        if self
            .working
            .merch_orders
            .values()
            .any(|o| o.gateway_order_id == order.gateway_order_id)
        {
            return Err(conflict("merch_orders"));
        }
        self.working.merch_orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn save_merch_order(&mut self, order: &MerchOrder) -> AppResult<()> {
        if !self.working.merch_orders.contains_key(&order.id) {
            return Err(AppError::NotFound);
        }
        self.working.merch_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn payment_by_order_id(
        &mut self,
        gateway_order_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        Ok(self.working.payment_by_order(gateway_order_id).cloned())
    }

    async fn payment_by_gateway_payment_id(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| {
                p.payment_type != PaymentType::Refund
                    && p.gateway_payment_id.as_deref() == Some(gateway_payment_id)
            })
            .cloned())
    }

    async fn insert_payment(&mut self, input: &NewPaymentRecord) -> AppResult<PaymentRecord> {
        let now = Utc::now();
        let payment = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            payment_type: input.payment_type,
            amount: input.amount,
            currency: input.currency.clone(),
            status: input.status,
            gateway_order_id: input.gateway_order_id.clone(),
            gateway_payment_id: input.gateway_payment_id.clone(),
            gateway_signature: None,
            metadata: input.metadata.clone(),
            ref_type: input.ref_type,
            ref_id: input.ref_id,
            created_at: now,
            updated_at: now,
        };
        self.working.check_payment(&payment)?;
        self.working.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn save_payment(&mut self, payment: &PaymentRecord) -> AppResult<()> {
        let Some(stored) = self.working.payments.get(&payment.id) else {
            return Err(AppError::NotFound);
        };
        let mut updated = payment.clone();
        updated.amount = stored.amount;
        updated.payment_type = stored.payment_type;
        self.working.check_payment(&updated)?;
        self.working.payments.insert(updated.id, updated);
        Ok(())
    }

    async fn payments_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        let rows = self
            .working
            .payments_for(user_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &PaymentRecord| p.created_at))
    }

    async fn refund_by_id(&mut self, id: Uuid) -> AppResult<Option<RefundRequest>> {
        Ok(self.working.refunds.get(&id).cloned())
    }

    async fn refund_by_gateway_refund_id(
        &mut self,
        gateway_refund_id: &str,
    ) -> AppResult<Option<RefundRequest>> {
        Ok(self
            .working
            .refunds
            .values()
            .find(|r| r.gateway_refund_id.as_deref() == Some(gateway_refund_id))
            .cloned())
    }

    async fn open_refund_for_payment(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<RefundRequest>> {
        let open: Vec<RefundRequest> = self
            .working
            .refunds
            .values()
            .filter(|r| {
                r.status.is_open() && r.gateway_payment_id.as_deref() == Some(gateway_payment_id)
            })
            .cloned()
            .collect();
        Ok(newest_first(open, |r: &RefundRequest| r.created_at)
            .into_iter()
            .next())
    }

    async fn open_refund_for_target(
        &mut self,
        target: RefundTarget,
    ) -> AppResult<Option<RefundRequest>> {
        Ok(self
            .working
            .refunds
            .values()
            .find(|r| r.status.is_open() && r.target() == Some(target))
            .cloned())
    }

    async fn insert_refund(&mut self, input: &NewRefundRequest) -> AppResult<RefundRequest> {
        let now = Utc::now();
        let refund = RefundRequest {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            subscription_id: input.subscription_id,
            purchase_id: input.purchase_id,
            amount: input.amount,
            currency: input.currency.clone(),
            reason: input.reason.clone(),
            status: input.status,
            gateway_payment_id: input.gateway_payment_id.clone(),
            gateway_refund_id: input.gateway_refund_id.clone(),
            admin_note: None,
            processed_by: None,
            processed_at: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.check_refund(&refund)?;
        self.working.refunds.insert(refund.id, refund.clone());
        Ok(refund)
    }

    async fn save_refund(&mut self, refund: &RefundRequest) -> AppResult<()> {
        if !self.working.refunds.contains_key(&refund.id) {
            return Err(AppError::NotFound);
        }
        self.working.check_refund(refund)?;
        self.working.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn refunds_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<RefundRequest>> {
        let rows = self
            .working
            .refunds_for(user_id)
            .into_iter()
            .cloned()
            .collect();
        Ok(newest_first(rows, |r: &RefundRequest| r.created_at))
    }

    async fn refunds_by_status(
        &mut self,
        status: Option<RefundStatus>,
    ) -> AppResult<Vec<RefundRequest>> {
        let rows = self
            .working
            .refunds
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r: &RefundRequest| r.created_at))
    }

    async fn webhook_event_seen(&mut self, event_id: &str) -> AppResult<bool> {
        Ok(self.working.webhook_events.contains_key(event_id))
    }

    async fn record_webhook_event(
        &mut self,
        event_id: &str,
        event_type: &str,
        outcome: &str,
    ) -> AppResult<()> {
        if self.working.webhook_events.contains_key(event_id) {
            return Err(conflict("webhook_events"));
        }
        self.working.webhook_events.insert(
            event_id.to_string(),
            WebhookEventRow {
                event_type: event_type.to_string(),
                outcome: outcome.to_string(),
            },
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryLedgerTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

// ============================================================================
// InMemoryCatalog
// ============================================================================

#[derive(Default)]
pub struct InMemoryCatalog {
    pub plans: HashMap<Uuid, Plan>,
    pub contents: HashMap<(ContentKind, Uuid), ContentItem>,
    pub merch_items: HashMap<Uuid, MerchItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(mut self, plans: Vec<Plan>) -> Self {
        self.plans.extend(plans.into_iter().map(|p| (p.id, p)));
        self
    }

    pub fn with_contents(mut self, contents: Vec<ContentItem>) -> Self {
        self.contents
            .extend(contents.into_iter().map(|c| ((c.kind, c.id), c)));
        self
    }

    pub fn with_merch_items(mut self, items: Vec<MerchItem>) -> Self {
        self.merch_items
            .extend(items.into_iter().map(|m| (m.id, m)));
        self
    }
}

#[async_trait]
impl CatalogRepo for InMemoryCatalog {
    async fn plan(&self, id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self.plans.get(&id).cloned())
    }

    async fn content(&self, kind: ContentKind, id: Uuid) -> AppResult<Option<ContentItem>> {
        Ok(self.contents.get(&(kind, id)).cloned())
    }

    async fn merch_item(&self, id: Uuid) -> AppResult<Option<MerchItem>> {
        Ok(self.merch_items.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::entities::catalog::BillingInterval,
        test_utils::{create_test_content, create_test_plan, create_test_subscription},
    };
    use rust_decimal_macros::dec;

    fn new_subscription(user_id: Uuid) -> NewSubscription {
        let now = Utc::now();
        NewSubscription {
            user_id,
            plan_id: Uuid::new_v4(),
            amount: dec!(299),
            currency: "INR".into(),
            interval: BillingInterval::Month,
            current_period_start: now,
            current_period_end: now,
            gateway_order_id: None,
            gateway_payment_id: None,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let ledger = InMemoryLedger::new();
        let user_id = Uuid::new_v4();

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.insert_subscription(&new_subscription(user_id))
                .await
                .unwrap();
        }
        assert!(ledger.snapshot().await.subscriptions.is_empty());

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_subscription(&new_subscription(user_id))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(ledger.snapshot().await.subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn second_granting_subscription_is_rejected() {
        let user_id = Uuid::new_v4();
        let plan = create_test_plan(|_| {});
        let existing = create_test_subscription(user_id, &plan, |_| {});
        let ledger = InMemoryLedger::new().with_subscriptions(vec![existing]);

        let mut tx = ledger.begin().await.unwrap();
        let result = tx.insert_subscription(&new_subscription(user_id)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn catalog_keys_items_by_kind_and_id() {
        let content = create_test_content(|_| {});
        let playlist = create_test_content(|c| {
            c.id = content.id;
            c.kind = ContentKind::Playlist;
            c.price = dec!(199);
        });
        let catalog = InMemoryCatalog::new().with_contents(vec![content.clone(), playlist]);

        let found = catalog.content(ContentKind::Content, content.id).await.unwrap();
        assert_eq!(found.unwrap().price, content.price);
        let found = catalog.content(ContentKind::Playlist, content.id).await.unwrap();
        assert_eq!(found.unwrap().price, dec!(199));
        assert!(
            catalog
                .content(ContentKind::Playlist, Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }
}
