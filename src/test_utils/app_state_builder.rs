//! Builds an `AppState` over in-memory ports for HTTP-level tests.
//!
//! ```ignore
//! let plan = create_test_plan(|_| {});
//! let (app_state, harness) = TestAppStateBuilder::new().with_plans(vec![plan]).build();
//! let server = TestServer::new(router().with_state(app_state)).unwrap();
//! ```

use std::{sync::Arc, time::Duration};

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    domain::entities::catalog::{ContentItem, MerchItem, Plan},
    infra::{
        config::{AppConfig, GatewayMode},
        setup::build_app_state,
    },
    test_utils::{
        InMemoryCatalog, InMemoryGateway, InMemoryLedger, TEST_KEY_ID, TEST_KEY_SECRET,
        TEST_WEBHOOK_SECRET, test_jwt_secret,
    },
};

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://localhost/unused".to_string(),
        database_max_connections: 1,
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        jwt_secret: test_jwt_secret(),
        gateway_mode: GatewayMode::Sandbox,
        gateway_base_url: Url::parse("http://127.0.0.1:9").unwrap(),
        gateway_key_id: TEST_KEY_ID.to_string(),
        gateway_key_secret: SecretString::from(TEST_KEY_SECRET),
        gateway_webhook_secret: SecretString::from(TEST_WEBHOOK_SECRET),
        gateway_timeout: Duration::from_secs(1),
        default_currency: "INR".to_string(),
        rollover_interval: Duration::from_secs(60),
        log_file: None,
    }
}

/// Handles to the ports behind a built `AppState`, for seeding and assertions.
pub struct TestHarness {
    pub ledger: Arc<InMemoryLedger>,
    pub catalog: Arc<InMemoryCatalog>,
    pub gateway: Arc<InMemoryGateway>,
}

pub struct TestAppStateBuilder {
    ledger: InMemoryLedger,
    catalog: InMemoryCatalog,
    gateway: InMemoryGateway,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            ledger: InMemoryLedger::new(),
            catalog: InMemoryCatalog::new(),
            gateway: InMemoryGateway::new(),
        }
    }

    pub fn with_ledger(mut self, ledger: InMemoryLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_gateway(mut self, gateway: InMemoryGateway) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_plans(mut self, plans: Vec<Plan>) -> Self {
        self.catalog = self.catalog.with_plans(plans);
        self
    }

    pub fn with_contents(mut self, contents: Vec<ContentItem>) -> Self {
        self.catalog = self.catalog.with_contents(contents);
        self
    }

    pub fn with_merch_items(mut self, items: Vec<MerchItem>) -> Self {
        self.catalog = self.catalog.with_merch_items(items);
        self
    }

    pub fn build(self) -> (AppState, TestHarness) {
        let ledger = Arc::new(self.ledger);
        let catalog = Arc::new(self.catalog);
        let gateway = Arc::new(self.gateway);

        let app_state = build_app_state(
            test_config(),
            ledger.clone(),
            catalog.clone(),
            gateway.clone(),
        );

        (
            app_state,
            TestHarness {
                ledger,
                catalog,
                gateway,
            },
        )
    }
}
