use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days after the target's creation during which a user may ask for a refund.
pub const REFUND_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Processed,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Processed => "processed",
            RefundStatus::Rejected => "rejected",
        }
    }

    /// Transitions only move forward:
    /// pending -> approved | rejected, approved -> processed | rejected.
    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        matches!(
            (self, next),
            (RefundStatus::Pending, RefundStatus::Approved)
                | (RefundStatus::Pending, RefundStatus::Rejected)
                | (RefundStatus::Approved, RefundStatus::Processed)
                | (RefundStatus::Approved, RefundStatus::Rejected)
        )
    }

    /// Pending and approved requests block a second request on the same target.
    pub fn is_open(&self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Approved)
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RefundStatus::Pending),
            "approved" => Ok(RefundStatus::Approved),
            "processed" => Ok(RefundStatus::Processed),
            "rejected" => Ok(RefundStatus::Rejected),
            _ => Err(format!("Unknown refund status: {}", s)),
        }
    }
}

/// The ledger entity a user refund request points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundTarget {
    Subscription(Uuid),
    Purchase(Uuid),
}

impl RefundTarget {
    pub fn from_parts(subscription_id: Option<Uuid>, purchase_id: Option<Uuid>) -> Option<Self> {
        match (subscription_id, purchase_id) {
            (Some(id), None) => Some(RefundTarget::Subscription(id)),
            (None, Some(id)) => Some(RefundTarget::Purchase(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub reason: String,
    pub status: RefundStatus,
    pub gateway_payment_id: Option<String>,
    pub gateway_refund_id: Option<String>,
    pub admin_note: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Set while a gateway refund call is in flight.
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefundRequest {
    pub fn target(&self) -> Option<RefundTarget> {
        RefundTarget::from_parts(self.subscription_id, self.purchase_id)
    }

    /// Moves an approved request to processed.
    pub fn mark_processed(
        &mut self,
        gateway_refund_id: Option<&str>,
        processed_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) {
        self.status = RefundStatus::Processed;
        if let Some(id) = gateway_refund_id {
            self.gateway_refund_id = Some(id.to_string());
        }
        if processed_by.is_some() {
            self.processed_by = processed_by;
        }
        self.processed_at = Some(now);
        self.processing_started_at = None;
        self.updated_at = now;
    }

    /// A gateway call started less than `lease` ago is still considered in
    /// flight. Older markers belong to a crashed attempt.
    pub fn gateway_call_in_flight(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        self.processing_started_at
            .is_some_and(|started| now - started < lease)
    }

    /// Appends an operator or gateway note, keeping earlier ones.
    pub fn add_note(&mut self, note: &str) {
        self.admin_note = Some(match self.admin_note.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct NewRefundRequest {
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub reason: String,
    pub status: RefundStatus,
    pub gateway_payment_id: Option<String>,
    pub gateway_refund_id: Option<String>,
}
