pub mod orders;
pub mod payment_verification;
pub mod refunds;
pub mod settlement;
pub mod subscriptions;
pub mod webhook_reconciler;
