//! Append-only audit entries for every money movement attempt.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::order_intent::OrderIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Subscription,
    SubscriptionUpgrade,
    SubscriptionRenewal,
    Purchase,
    Playlist,
    Merch,
    Refund,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Subscription => "subscription",
            PaymentType::SubscriptionUpgrade => "subscription_upgrade",
            PaymentType::SubscriptionRenewal => "subscription_renewal",
            PaymentType::Purchase => "purchase",
            PaymentType::Playlist => "playlist",
            PaymentType::Merch => "merch",
            PaymentType::Refund => "refund",
        }
    }

    pub fn for_intent(intent: OrderIntent) -> Self {
        match intent {
            OrderIntent::Purchase => PaymentType::Purchase,
            OrderIntent::Playlist => PaymentType::Playlist,
            OrderIntent::Merch => PaymentType::Merch,
            OrderIntent::SubscriptionNew | OrderIntent::SubscriptionDowngrade => {
                PaymentType::Subscription
            }
            OrderIntent::SubscriptionUpgrade => PaymentType::SubscriptionUpgrade,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Statuses a gateway capture may complete. The gateway has the money,
    /// so a record failed by a bad client signature is still settled.
    pub fn accepts_capture(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which ledger entity a payment concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_ref_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Subscription,
    Purchase,
    MerchOrder,
}

/// Typed view of the free-form metadata column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<OrderIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_plan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proration_credit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_request_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_refund_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub gateway_signature: Option<String>,
    pub metadata: PaymentMetadata,
    pub ref_type: Option<RefType>,
    pub ref_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub user_id: Uuid,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub metadata: PaymentMetadata,
    pub ref_type: Option<RefType>,
    pub ref_id: Option<Uuid>,
}
