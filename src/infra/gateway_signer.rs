//! HMAC-SHA256 signatures shared with the payment gateway.
//!
//! Checkout signatures cover `order_id|payment_id` and are keyed with the API
//! key secret. Webhook signatures cover the raw request body and are keyed with
//! the webhook secret. Both travel as lowercase hex.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct GatewaySigner {
    key_secret: SecretString,
    webhook_secret: SecretString,
}

impl GatewaySigner {
    pub fn new(key_secret: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            key_secret,
            webhook_secret,
        }
    }

    pub fn sign_payment(&self, order_id: &str, payment_id: &str) -> AppResult<String> {
        let mut mac = keyed(&self.key_secret)?;
        mac.update(payment_message(order_id, payment_id).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn sign_webhook(&self, body: &[u8]) -> AppResult<String> {
        let mut mac = keyed(&self.webhook_secret)?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> AppResult<()> {
        let mut mac = keyed(&self.key_secret)?;
        mac.update(payment_message(order_id, payment_id).as_bytes());
        check(mac, signature)
    }

    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> AppResult<()> {
        let mut mac = keyed(&self.webhook_secret)?;
        mac.update(body);
        check(mac, signature)
    }
}

fn payment_message(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

fn keyed(secret: &SecretString) -> AppResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AppError::Internal("HMAC key rejected".into()))
}

/// Constant-time comparison through `verify_slice`.
fn check(mac: HmacSha256, signature: &str) -> AppResult<()> {
    let provided = hex::decode(signature.trim()).map_err(|_| AppError::InvalidSignature)?;
    mac.verify_slice(&provided)
        .map_err(|_| AppError::InvalidSignature)
}
