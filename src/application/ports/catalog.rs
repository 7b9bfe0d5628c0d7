use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::catalog::{ContentItem, ContentKind, MerchItem, Plan},
};

/// Read-only view of the priced catalog. Inactive entries are returned so
/// callers can tell "inactive" from "absent" in logs.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn plan(&self, id: Uuid) -> AppResult<Option<Plan>>;
    async fn content(&self, kind: ContentKind, id: Uuid) -> AppResult<Option<ContentItem>>;
    async fn merch_item(&self, id: Uuid) -> AppResult<Option<MerchItem>>;
}
