use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::AppResult,
    application::ports::catalog::CatalogRepo,
    domain::entities::catalog::{ContentItem, ContentKind, MerchItem, Plan},
};

#[async_trait]
impl CatalogRepo for PostgresPersistence {
    async fn plan(&self, id: Uuid) -> AppResult<Option<Plan>> {
        let row = sqlx::query(
            "SELECT id, name, price, currency, billing_interval, is_active FROM plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| Plan {
            id: row.get("id"),
            name: row.get("name"),
            price: row.get("price"),
            currency: self.currency_or_default(row.get("currency")),
            interval: row.get("billing_interval"),
            is_active: row.get("is_active"),
        }))
    }

    async fn content(&self, kind: ContentKind, id: Uuid) -> AppResult<Option<ContentItem>> {
        let table = match kind {
            ContentKind::Content => "contents",
            ContentKind::Playlist => "playlists",
        };
        let row = sqlx::query(&format!(
            "SELECT id, title, price, currency, is_free, is_active FROM {table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| ContentItem {
            id: row.get("id"),
            kind,
            title: row.get("title"),
            price: row.get("price"),
            currency: self.currency_or_default(row.get("currency")),
            is_free: row.get("is_free"),
            is_active: row.get("is_active"),
        }))
    }

    async fn merch_item(&self, id: Uuid) -> AppResult<Option<MerchItem>> {
        let row = sqlx::query(
            "SELECT id, name, price, currency, stock, is_active FROM merch_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| MerchItem {
            id: row.get("id"),
            name: row.get("name"),
            price: row.get("price"),
            currency: self.currency_or_default(row.get("currency")),
            stock: row.get("stock"),
            is_active: row.get("is_active"),
        }))
    }
}
