use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        CreateOrderRequest, GatewayOrder, GatewayRefund, PaymentGatewayPort, RefundPaymentRequest,
    },
    infra::gateway_signer::GatewaySigner,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// REST client for the hosted payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
    signer: GatewaySigner,
}

impl GatewayClient {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: SecretString,
        signer: GatewaySigner,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
            signer,
        })
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.key_id,
            self.key_secret.expose_secret()
        ));
        format!("Basic {}", encoded)
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> AppResult<T> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header());
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(path = %path, error = %e, timeout = e.is_timeout(), "Gateway request failed");
                AppError::GatewayUnavailable(format!("Gateway request failed: {}", e))
            })?;

        handle_response(path, response).await
    }
}

#[derive(Serialize)]
struct OrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    amount: i64,
    receipt: &'a str,
    notes: &'a BTreeMap<String, String>,
}

#[async_trait]
impl PaymentGatewayPort for GatewayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder> {
        self.post(
            "/orders",
            &OrderBody {
                amount: request.amount_minor,
                currency: &request.currency,
                receipt: &request.receipt,
                notes: &request.notes,
            },
            None,
        )
        .await
    }

    async fn refund(&self, request: RefundPaymentRequest) -> AppResult<GatewayRefund> {
        self.post(
            &format!("/payments/{}/refund", request.payment_id),
            &RefundBody {
                amount: request.amount_minor,
                receipt: &request.idempotency_key,
                notes: &request.notes,
            },
            Some(&request.idempotency_key),
        )
        .await
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> AppResult<()> {
        self.signer.verify_payment(order_id, payment_id, signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> AppResult<()> {
        self.signer.verify_webhook(body, signature)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayErrorResponse {
    error: GatewayErrorBody,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

async fn handle_response<T: for<'de> Deserialize<'de>>(
    path: &str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::GatewayUnavailable(format!("Failed to read response: {}", e)))?;

    if !status.is_success() {
        tracing::error!(path = %path, status = %status, body = %body, "Gateway API error");
        return Err(classify_failure(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(path = %path, body = %body, error = %e, "Failed to parse gateway response");
        AppError::Internal(format!("Failed to parse gateway response: {}", e))
    })
}

/// Server-side and throttling failures are retryable, the rest are refusals.
fn classify_failure(status: StatusCode, body: &str) -> AppError {
    let detail = serde_json::from_str::<GatewayErrorResponse>(body)
        .ok()
        .and_then(|e| e.error.description.or(e.error.code))
        .unwrap_or_else(|| status.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::GatewayUnavailable(detail)
    } else {
        AppError::GatewayRejected(detail)
    }
}
