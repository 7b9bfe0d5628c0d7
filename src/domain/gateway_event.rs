//! Closed set of webhook events the reconciler understands.
//!
//! The gateway posts `{ "event": "...", "payload": { "<entity>": { "entity": {...} } } }`.
//! Every known event type maps to one variant. Types that have no ledger
//! representation land in `Observed`; anything else lands in `Unknown` and is
//! logged loudly.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::app_error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundEntity {
    pub id: String,
    pub payment_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionEntity {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub current_start: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    pub current_end: Option<i64>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl SubscriptionEntity {
    pub fn current_period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = DateTime::from_timestamp(self.current_start?, 0)?;
        let end = DateTime::from_timestamp(self.current_end?, 0)?;
        Some((start, end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceEntity {
    pub id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Reads a string note; the gateway sends `[]` instead of `{}` when empty.
pub fn note<'a>(notes: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    notes.get(key).and_then(|v| v.as_str())
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    PaymentCaptured(PaymentEntity),
    PaymentFailed(PaymentEntity),
    RefundCreated(RefundEntity),
    RefundProcessed(RefundEntity),
    RefundFailed(RefundEntity),
    SubscriptionCharged {
        subscription: SubscriptionEntity,
        payment: Option<PaymentEntity>,
    },
    SubscriptionHalted(SubscriptionEntity),
    SubscriptionPending(SubscriptionEntity),
    SubscriptionCancelled(SubscriptionEntity),
    SubscriptionCompleted(SubscriptionEntity),
    InvoiceExpired(InvoiceEntity),
    /// Known to the gateway, deliberately not acted on (disputes, transfers, settlements).
    Observed { event_type: String },
    Unknown { event_type: String },
}

#[derive(Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Deserialize, Default)]
struct RawPayload {
    #[serde(default)]
    payment: Option<Wrapped<PaymentEntity>>,
    #[serde(default)]
    refund: Option<Wrapped<RefundEntity>>,
    #[serde(default)]
    subscription: Option<Wrapped<SubscriptionEntity>>,
    #[serde(default)]
    invoice: Option<Wrapped<InvoiceEntity>>,
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    payload: RawPayload,
}

const OBSERVED_PREFIXES: &[&str] = &[
    "payment.dispute.",
    "transfer.",
    "settlement.",
    "payout.",
    "order.",
    "payment.authorized",
    "invoice.paid",
    "invoice.partially_paid",
    "subscription.activated",
    "subscription.authenticated",
    "subscription.updated",
    "subscription.resumed",
    "subscription.paused",
];

impl GatewayEvent {
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook payload: {e}")))?;
        let RawEvent { event, payload } = raw;

        let event = match event.as_str() {
            "payment.captured" => GatewayEvent::PaymentCaptured(require(payload.payment, &event)?),
            "payment.failed" => GatewayEvent::PaymentFailed(require(payload.payment, &event)?),
            "refund.created" => GatewayEvent::RefundCreated(require(payload.refund, &event)?),
            "refund.processed" => GatewayEvent::RefundProcessed(require(payload.refund, &event)?),
            "refund.failed" => GatewayEvent::RefundFailed(require(payload.refund, &event)?),
            "subscription.charged" => GatewayEvent::SubscriptionCharged {
                subscription: require(payload.subscription, &event)?,
                payment: payload.payment.map(|w| w.entity),
            },
            "subscription.halted" => {
                GatewayEvent::SubscriptionHalted(require(payload.subscription, &event)?)
            }
            "subscription.pending" => {
                GatewayEvent::SubscriptionPending(require(payload.subscription, &event)?)
            }
            "subscription.cancelled" => {
                GatewayEvent::SubscriptionCancelled(require(payload.subscription, &event)?)
            }
            "subscription.completed" => {
                GatewayEvent::SubscriptionCompleted(require(payload.subscription, &event)?)
            }
            "invoice.expired" => GatewayEvent::InvoiceExpired(require(payload.invoice, &event)?),
            other if OBSERVED_PREFIXES.iter().any(|p| other.starts_with(p)) => {
                GatewayEvent::Observed { event_type: event }
            }
            _ => GatewayEvent::Unknown { event_type: event },
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            GatewayEvent::PaymentCaptured(_) => "payment.captured",
            GatewayEvent::PaymentFailed(_) => "payment.failed",
            GatewayEvent::RefundCreated(_) => "refund.created",
            GatewayEvent::RefundProcessed(_) => "refund.processed",
            GatewayEvent::RefundFailed(_) => "refund.failed",
            GatewayEvent::SubscriptionCharged { .. } => "subscription.charged",
            GatewayEvent::SubscriptionHalted(_) => "subscription.halted",
            GatewayEvent::SubscriptionPending(_) => "subscription.pending",
            GatewayEvent::SubscriptionCancelled(_) => "subscription.cancelled",
            GatewayEvent::SubscriptionCompleted(_) => "subscription.completed",
            GatewayEvent::InvoiceExpired(_) => "invoice.expired",
            GatewayEvent::Observed { event_type } | GatewayEvent::Unknown { event_type } => {
                event_type
            }
        }
    }
}

fn require<T>(entity: Option<Wrapped<T>>, event: &str) -> AppResult<T> {
    entity
        .map(|w| w.entity)
        .ok_or_else(|| AppError::InvalidInput(format!("{event} payload is missing its entity")))
}
