//! Transactional access to the payment ledger.
//!
//! Every use-case invocation opens one [`LedgerTx`], reads what it needs
//! (rows are locked for the rest of the transaction), decides, writes and
//! commits. Dropping a transaction without calling `commit` discards all of
//! its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        catalog::ContentKind,
        merch_order::{MerchOrder, NewMerchOrder},
        payment_record::{NewPaymentRecord, PaymentRecord},
        purchase::{NewPurchase, Purchase},
        refund_request::{NewRefundRequest, RefundRequest, RefundStatus, RefundTarget},
        subscription::{NewSubscription, Subscription},
    },
};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;
}

#[async_trait]
pub trait LedgerTx: Send {
    // Subscriptions
    async fn subscription_by_id(&mut self, id: Uuid) -> AppResult<Option<Subscription>>;
    async fn subscription_by_gateway_id(
        &mut self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>>;
    /// Subscriptions of a user in an access-granting status.
    async fn granting_subscriptions(&mut self, user_id: Uuid) -> AppResult<Vec<Subscription>>;
    /// Locally billed, access-granting subscriptions whose period ended at or
    /// before `now`.
    async fn subscriptions_due_for_rollover(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>>;
    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription>;
    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()>;

    // Purchases
    async fn purchase_by_id(&mut self, id: Uuid) -> AppResult<Option<Purchase>>;
    async fn purchase_by_order_id(&mut self, gateway_order_id: &str)
    -> AppResult<Option<Purchase>>;
    async fn completed_purchase(
        &mut self,
        user_id: Uuid,
        kind: ContentKind,
        content_id: Uuid,
    ) -> AppResult<Option<Purchase>>;
    async fn insert_purchase(&mut self, input: &NewPurchase) -> AppResult<Purchase>;
    async fn save_purchase(&mut self, purchase: &Purchase) -> AppResult<()>;

    // Merch orders
    async fn merch_order_by_id(&mut self, id: Uuid) -> AppResult<Option<MerchOrder>>;
    async fn insert_merch_order(&mut self, input: &NewMerchOrder) -> AppResult<MerchOrder>;
    async fn save_merch_order(&mut self, order: &MerchOrder) -> AppResult<()>;

    // Payment history
    async fn payment_by_order_id(
        &mut self,
        gateway_order_id: &str,
    ) -> AppResult<Option<PaymentRecord>>;
    async fn payment_by_gateway_payment_id(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>>;
    async fn insert_payment(&mut self, input: &NewPaymentRecord) -> AppResult<PaymentRecord>;
    /// Persists status, gateway ids, metadata and reference. Amounts and
    /// types are never rewritten.
    async fn save_payment(&mut self, payment: &PaymentRecord) -> AppResult<()>;
    async fn payments_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<PaymentRecord>>;

    // Refund requests
    async fn refund_by_id(&mut self, id: Uuid) -> AppResult<Option<RefundRequest>>;
    async fn refund_by_gateway_refund_id(
        &mut self,
        gateway_refund_id: &str,
    ) -> AppResult<Option<RefundRequest>>;
    /// Latest pending or approved request for a gateway payment.
    async fn open_refund_for_payment(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<RefundRequest>>;
    async fn open_refund_for_target(
        &mut self,
        target: RefundTarget,
    ) -> AppResult<Option<RefundRequest>>;
    async fn insert_refund(&mut self, input: &NewRefundRequest) -> AppResult<RefundRequest>;
    async fn save_refund(&mut self, refund: &RefundRequest) -> AppResult<()>;
    async fn refunds_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<RefundRequest>>;
    async fn refunds_by_status(
        &mut self,
        status: Option<RefundStatus>,
    ) -> AppResult<Vec<RefundRequest>>;

    // Webhook delivery log
    async fn webhook_event_seen(&mut self, event_id: &str) -> AppResult<bool>;
    async fn record_webhook_event(
        &mut self,
        event_id: &str,
        event_type: &str,
        outcome: &str,
    ) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
