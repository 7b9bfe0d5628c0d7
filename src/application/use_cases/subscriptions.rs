use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{catalog::CatalogRepo, ledger::LedgerStore},
        use_cases::orders::current_subscription,
    },
    domain::{
        billing_period::advance_period,
        entities::{
            payment_record::PaymentRecord,
            subscription::{Subscription, SubscriptionStatus},
        },
    },
};

/// Subscriptions handled per rollover pass.
const ROLLOVER_BATCH: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RolloverReport {
    pub downgraded: usize,
    pub renewed: usize,
    pub expired: usize,
}

pub struct SubscriptionUseCases {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogRepo>,
}

impl SubscriptionUseCases {
    pub fn new(ledger: Arc<dyn LedgerStore>, catalog: Arc<dyn CatalogRepo>) -> Self {
        Self { ledger, catalog }
    }

    pub async fn current(&self, user_id: Uuid) -> AppResult<Subscription> {
        let mut tx = self.ledger.begin().await?;
        current_subscription(tx.as_mut(), user_id)
            .await
            .map_err(|_| AppError::NotFound)
    }

    pub async fn payment_history(&self, user_id: Uuid) -> AppResult<Vec<PaymentRecord>> {
        let mut tx = self.ledger.begin().await?;
        tx.payments_for_user(user_id).await
    }

    /// Keeps access until the period ends, then the rollover expires it.
    pub async fn cancel_at_period_end(&self, user_id: Uuid) -> AppResult<Subscription> {
        let mut tx = self.ledger.begin().await?;
        let mut subscription = current_subscription(tx.as_mut(), user_id).await?;
        if subscription.cancel_at_period_end {
            return Ok(subscription);
        }
        subscription.cancel_at_period_end = true;
        subscription.pending_plan_id = None;
        subscription.status = SubscriptionStatus::Active;
        subscription.updated_at = Utc::now();
        tx.save_subscription(&subscription).await?;
        tx.commit().await?;

        info!(
            subscription_id = %subscription.id,
            ends_at = %subscription.current_period_end,
            "Subscription set to cancel at period end"
        );
        Ok(subscription)
    }

    /// Closes out locally billed periods that have ended:
    /// flagged cancellations expire, due downgrades switch plan and start the
    /// next period, free plans roll into the next period, and paid periods
    /// with nothing renewing them lapse to expired.
    /// Gateway-billed subscriptions are left to the renewal webhook.
    pub async fn run_rollover(&self, now: DateTime<Utc>) -> AppResult<RolloverReport> {
        let mut report = RolloverReport::default();
        let mut tx = self.ledger.begin().await?;

        for mut subscription in tx.subscriptions_due_for_rollover(now, ROLLOVER_BATCH).await? {
            if subscription.cancel_at_period_end {
                expire(&mut subscription, now);
                tx.save_subscription(&subscription).await?;
                report.expired += 1;
                info!(subscription_id = %subscription.id, "Subscription expired at period end");
                continue;
            }

            match subscription.pending_plan_id.take() {
                Some(pending_plan_id) => match self.catalog.plan(pending_plan_id).await? {
                    Some(plan) => {
                        info!(
                            subscription_id = %subscription.id,
                            from_plan = %subscription.plan_id,
                            to_plan = %plan.id,
                            "Scheduled downgrade applied"
                        );
                        subscription.plan_id = plan.id;
                        subscription.amount = plan.price;
                        subscription.currency = plan.currency;
                        subscription.interval = plan.interval;
                        start_next_period(&mut subscription);
                        report.downgraded += 1;
                    }
                    None => {
                        warn!(
                            subscription_id = %subscription.id,
                            plan_id = %pending_plan_id,
                            "Scheduled plan no longer exists, dropping the downgrade"
                        );
                        subscription.status = SubscriptionStatus::Active;
                    }
                },
                None if subscription.amount.is_zero() => {
                    start_next_period(&mut subscription);
                    report.renewed += 1;
                    info!(subscription_id = %subscription.id, "Free subscription rolled into next period");
                }
                None => {
                    expire(&mut subscription, now);
                    report.expired += 1;
                    info!(subscription_id = %subscription.id, "Prepaid period ended without renewal");
                }
            }
            subscription.updated_at = now;
            tx.save_subscription(&subscription).await?;
        }

        tx.commit().await?;
        Ok(report)
    }
}

fn start_next_period(subscription: &mut Subscription) {
    subscription.current_period_start = subscription.current_period_end;
    subscription.current_period_end =
        advance_period(subscription.current_period_start, subscription.interval);
    subscription.status = SubscriptionStatus::Active;
}

fn expire(subscription: &mut Subscription, now: DateTime<Utc>) {
    subscription.status = SubscriptionStatus::Expired;
    subscription.pending_plan_id = None;
    subscription.updated_at = now;
}
