use dotenvy::dotenv;
use tracing::info;

use content_billing::infra::{
    app::create_app,
    config::AppConfig,
    period_rollover::run_period_rollover_loop,
    setup::{init_app_state, init_tracing},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_file.as_deref())?;

    let app_state = init_app_state(config).await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state.clone());

    // Applies scheduled downgrades and cancellations of locally billed subscriptions.
    let subscription_use_cases = app_state.subscription_use_cases.clone();
    let rollover_interval = app_state.config.rollover_interval;
    tokio::spawn(async move {
        run_period_rollover_loop(subscription_use_cases, rollover_interval).await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
