//! `LedgerStore` backed by one Postgres transaction per unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence, merch_order, payment_history, purchase, refund_request,
        subscription, webhook_event,
    },
    app_error::AppResult,
    application::ports::ledger::{LedgerStore, LedgerTx},
    domain::entities::{
        catalog::ContentKind,
        merch_order::{MerchOrder, NewMerchOrder},
        payment_record::{NewPaymentRecord, PaymentRecord},
        purchase::{NewPurchase, Purchase},
        refund_request::{NewRefundRequest, RefundRequest, RefundStatus, RefundTarget},
        subscription::{NewSubscription, Subscription},
    },
};

/// Rolled back on drop unless committed.
pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PostgresPersistence {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let tx = self.pool().begin().await?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn subscription_by_id(&mut self, id: Uuid) -> AppResult<Option<Subscription>> {
        subscription::by_id(&mut self.tx, id).await
    }

    async fn subscription_by_gateway_id(
        &mut self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        subscription::by_gateway_id(&mut self.tx, gateway_subscription_id).await
    }

    async fn granting_subscriptions(&mut self, user_id: Uuid) -> AppResult<Vec<Subscription>> {
        subscription::granting_for_user(&mut self.tx, user_id).await
    }

    async fn subscriptions_due_for_rollover(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Subscription>> {
        subscription::due_for_rollover(&mut self.tx, now, limit).await
    }

    async fn insert_subscription(&mut self, input: &NewSubscription) -> AppResult<Subscription> {
        subscription::insert(&mut self.tx, input).await
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()> {
        subscription::save(&mut self.tx, subscription).await
    }

    async fn purchase_by_id(&mut self, id: Uuid) -> AppResult<Option<Purchase>> {
        purchase::by_id(&mut self.tx, id).await
    }

    async fn purchase_by_order_id(
        &mut self,
        gateway_order_id: &str,
    ) -> AppResult<Option<Purchase>> {
        purchase::by_order_id(&mut self.tx, gateway_order_id).await
    }

    async fn completed_purchase(
        &mut self,
        user_id: Uuid,
        kind: ContentKind,
        content_id: Uuid,
    ) -> AppResult<Option<Purchase>> {
        purchase::completed(&mut self.tx, user_id, kind, content_id).await
    }

    async fn insert_purchase(&mut self, input: &NewPurchase) -> AppResult<Purchase> {
        purchase::insert(&mut self.tx, input).await
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> AppResult<()> {
        purchase::save(&mut self.tx, purchase).await
    }

    async fn merch_order_by_id(&mut self, id: Uuid) -> AppResult<Option<MerchOrder>> {
        merch_order::by_id(&mut self.tx, id).await
    }

    async fn insert_merch_order(&mut self, input: &NewMerchOrder) -> AppResult<MerchOrder> {
        merch_order::insert(&mut self.tx, input).await
    }

    async fn save_merch_order(&mut self, order: &MerchOrder) -> AppResult<()> {
        merch_order::save(&mut self.tx, order).await
    }

    async fn payment_by_order_id(
        &mut self,
        gateway_order_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        payment_history::by_order_id(&mut self.tx, gateway_order_id).await
    }

    async fn payment_by_gateway_payment_id(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        payment_history::by_gateway_payment_id(&mut self.tx, gateway_payment_id).await
    }

    async fn insert_payment(&mut self, input: &NewPaymentRecord) -> AppResult<PaymentRecord> {
        payment_history::insert(&mut self.tx, input).await
    }

    async fn save_payment(&mut self, payment: &PaymentRecord) -> AppResult<()> {
        payment_history::save(&mut self.tx, payment).await
    }

    async fn payments_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        payment_history::for_user(&mut self.tx, user_id).await
    }

    async fn refund_by_id(&mut self, id: Uuid) -> AppResult<Option<RefundRequest>> {
        refund_request::by_id(&mut self.tx, id).await
    }

    async fn refund_by_gateway_refund_id(
        &mut self,
        gateway_refund_id: &str,
    ) -> AppResult<Option<RefundRequest>> {
        refund_request::by_gateway_refund_id(&mut self.tx, gateway_refund_id).await
    }

    async fn open_refund_for_payment(
        &mut self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<RefundRequest>> {
        refund_request::open_for_payment(&mut self.tx, gateway_payment_id).await
    }

    async fn open_refund_for_target(
        &mut self,
        target: RefundTarget,
    ) -> AppResult<Option<RefundRequest>> {
        refund_request::open_for_target(&mut self.tx, target).await
    }

    async fn insert_refund(&mut self, input: &NewRefundRequest) -> AppResult<RefundRequest> {
        refund_request::insert(&mut self.tx, input).await
    }

    async fn save_refund(&mut self, refund: &RefundRequest) -> AppResult<()> {
        refund_request::save(&mut self.tx, refund).await
    }

    async fn refunds_for_user(&mut self, user_id: Uuid) -> AppResult<Vec<RefundRequest>> {
        refund_request::for_user(&mut self.tx, user_id).await
    }

    async fn refunds_by_status(
        &mut self,
        status: Option<RefundStatus>,
    ) -> AppResult<Vec<RefundRequest>> {
        refund_request::by_status(&mut self.tx, status).await
    }

    async fn webhook_event_seen(&mut self, event_id: &str) -> AppResult<bool> {
        webhook_event::seen(&mut self.tx, event_id).await
    }

    async fn record_webhook_event(
        &mut self,
        event_id: &str,
        event_type: &str,
        outcome: &str,
    ) -> AppResult<()> {
        webhook_event::record(&mut self.tx, event_id, event_type, outcome).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
