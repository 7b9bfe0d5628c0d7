use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "merch_order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MerchOrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl MerchOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchOrderStatus::Pending => "pending",
            MerchOrderStatus::Completed => "completed",
            MerchOrderStatus::Failed => "failed",
            MerchOrderStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MerchOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub merch_item_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    pub currency: String,
    pub status: MerchOrderStatus,
    pub shipping_address: Option<serde_json::Value>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMerchOrder {
    pub user_id: Uuid,
    pub merch_item_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    pub currency: String,
    pub shipping_address: Option<serde_json::Value>,
    pub gateway_order_id: String,
}
