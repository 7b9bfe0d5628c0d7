use crate::{
    adapters::persistence::PostgresPersistence,
    infra::{config::AppConfig, db::init_db, error::InfraError},
};

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway_client;
pub mod gateway_signer;
pub mod period_rollover;
pub mod sandbox_gateway;
pub mod setup;

pub async fn postgres_persistence(config: &AppConfig) -> Result<PostgresPersistence, InfraError> {
    let pool = init_db(&config.database_url, config.database_max_connections).await?;
    let persistence = PostgresPersistence::new(pool, config.default_currency.clone());
    Ok(persistence)
}
