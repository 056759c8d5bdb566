//! HMAC-signed gateway provider.
//!
//! The real gateway wire protocol is an external collaborator; this
//! implementation covers the parts the engine owns: minting payment
//! references and verifying the two HMAC-SHA256 signature schemes, one
//! over `"{payment_ref}|{payment_id}"` with the key secret and one over
//! the raw webhook body with the distinct webhook secret.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use common::Money;

use crate::{DomainError, Result};

use super::provider::{PaymentProvider, RefundReceipt, RemoteOrder};

type HmacSha256 = Hmac<Sha256>;

/// Computes the hex HMAC-SHA256 signature for a message. Exposed so tests
/// and webhook senders can produce valid signatures.
pub fn sign(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time signature check. Fails closed on malformed hex.
fn verify(secret: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DomainError::InvalidSignature)?;
    mac.update(message);
    let signature = hex::decode(signature_hex).map_err(|_| DomainError::InvalidSignature)?;
    mac.verify_slice(&signature)
        .map_err(|_| DomainError::InvalidSignature)
}

/// Payment provider backed by HMAC shared secrets.
#[derive(Debug, Clone)]
pub struct HmacGateway {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl HmacGateway {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl PaymentProvider for HmacGateway {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn create_remote_order(
        &self,
        amount: Money,
        currency: &str,
        _receipt: &str,
    ) -> Result<RemoteOrder> {
        Ok(RemoteOrder {
            provider_order_id: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
        })
    }

    fn verify_payment(&self, payment_ref: &str, payment_id: &str, signature: &str) -> Result<()> {
        let message = format!("{payment_ref}|{payment_id}");
        verify(&self.key_secret, message.as_bytes(), signature)
    }

    fn verify_webhook(&self, raw_body: &[u8], signature: &str) -> Result<()> {
        verify(&self.webhook_secret, raw_body, signature)
    }

    async fn refund(&self, _payment_ref: &str, _amount: Money) -> Result<RefundReceipt> {
        Ok(RefundReceipt {
            refund_id: format!("rfnd_{}", Uuid::new_v4().simple()),
        })
    }
}
