use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{catalog::CatalogRepo, ledger::LedgerStore, payment_gateway::PaymentGatewayPort},
        use_cases::{
            orders::OrderUseCases, payment_verification::PaymentVerificationUseCases,
            refunds::RefundUseCases, subscriptions::SubscriptionUseCases,
            webhook_reconciler::WebhookReconciler,
        },
    },
    infra::{
        config::{AppConfig, GatewayMode},
        error::InfraError,
        gateway_client::GatewayClient,
        gateway_signer::GatewaySigner,
        postgres_persistence,
        sandbox_gateway::SandboxGateway,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let postgres_arc = Arc::new(postgres_persistence(&config).await?);
    let gateway = payment_gateway(&config)?;

    Ok(build_app_state(
        config,
        postgres_arc.clone() as Arc<dyn LedgerStore>,
        postgres_arc as Arc<dyn CatalogRepo>,
        gateway,
    ))
}

/// Wires the use cases over the given ports.
pub fn build_app_state(
    config: AppConfig,
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogRepo>,
    gateway: Arc<dyn PaymentGatewayPort>,
) -> AppState {
    let order_use_cases = OrderUseCases::new(ledger.clone(), catalog.clone(), gateway.clone());

    let payment_verification_use_cases = PaymentVerificationUseCases::new(
        ledger.clone(),
        catalog.clone(),
        gateway.clone(),
        order_use_cases.clone(),
    );

    let webhook_reconciler = WebhookReconciler::new(ledger.clone(), catalog.clone(), gateway.clone());
    let refund_use_cases = RefundUseCases::new(ledger.clone(), gateway);
    let subscription_use_cases = SubscriptionUseCases::new(ledger, catalog);

    AppState {
        config: Arc::new(config),
        order_use_cases: Arc::new(order_use_cases),
        payment_verification_use_cases: Arc::new(payment_verification_use_cases),
        webhook_reconciler: Arc::new(webhook_reconciler),
        refund_use_cases: Arc::new(refund_use_cases),
        subscription_use_cases: Arc::new(subscription_use_cases),
    }
}

fn payment_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGatewayPort>, InfraError> {
    let signer = GatewaySigner::new(
        config.gateway_key_secret.clone(),
        config.gateway_webhook_secret.clone(),
    );

    match config.gateway_mode {
        GatewayMode::Live => {
            let client = GatewayClient::new(
                config.gateway_base_url.to_string(),
                config.gateway_key_id.clone(),
                config.gateway_key_secret.clone(),
                signer,
                config.gateway_timeout,
            )
            .map_err(|e| InfraError::GatewayInit(e.to_string()))?;
            Ok(Arc::new(client))
        }
        GatewayMode::Sandbox => {
            warn!("GATEWAY_MODE=sandbox: orders and refunds are simulated locally");
            Ok(Arc::new(SandboxGateway::new(
                config.gateway_key_id.clone(),
                signer,
            )))
        }
    }
}

pub fn init_tracing(log_file: Option<&str>) -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "content_billing=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don't show target (module path)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let json_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(InfraError::LogFile)?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}
