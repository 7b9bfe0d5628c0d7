//! Read-only catalog entries the engine prices orders against.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            BillingInterval::Month => 1,
            BillingInterval::Year => 12,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub interval: BillingInterval,
    pub is_active: bool,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }
}

/// Either a single content item or a playlist; both are bought the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Content,
    Playlist,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Content => "content",
            ContentKind::Playlist => "playlist",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub kind: ContentKind,
    pub title: String,
    pub price: Decimal,
    pub currency: String,
    pub is_free: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MerchItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub stock: i32,
    pub is_active: bool,
}
