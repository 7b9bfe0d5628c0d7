use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::{
    app_error::AppResult,
    use_cases::subscriptions::{RolloverReport, SubscriptionUseCases},
};

pub async fn run_period_rollover_loop(
    subscription_use_cases: Arc<SubscriptionUseCases>,
    every: Duration,
) {
    let mut ticker = interval(every);

    info!(
        "Period rollover service started (running every {}s)",
        every.as_secs()
    );

    loop {
        ticker.tick().await;

        if let Err(e) = rollover_once(&subscription_use_cases).await {
            error!(error = %e, retryable = e.is_retryable(), "Period rollover failed");
        }
    }
}

/// One pass over subscriptions whose period has ended.
pub async fn rollover_once(
    subscription_use_cases: &SubscriptionUseCases,
) -> AppResult<RolloverReport> {
    let report = subscription_use_cases.run_rollover(Utc::now()).await?;
    if report != RolloverReport::default() {
        info!(
            downgraded = report.downgraded,
            renewed = report.renewed,
            expired = report.expired,
            "Period rollover applied"
        );
    }
    Ok(report)
}
