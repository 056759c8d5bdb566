//! Phone OTP verification for cash on delivery.
//!
//! Two separate codes exist: a phone-ownership OTP sent before checkout
//! (5-minute expiry, stored per phone number) and an order-bound delivery
//! OTP minted at checkout (10-minute expiry, stored on the order). Only
//! SHA-256 hashes are persisted; the plaintext code lives solely in the
//! SMS body.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use common::{OrderId, Phone};
use store::{Order, PaymentEvent, PaymentLogEntry, PhoneVerification, Store};

use crate::{
    DomainError, Result,
    audit::log_payment,
    notify::{Notifier, best_effort},
};

/// Phone-ownership OTP lifetime.
pub const PHONE_OTP_TTL_MINUTES: i64 = 5;
/// Once verified, the phone record stays eligible for checkout this long.
pub const VERIFIED_WINDOW_MINUTES: i64 = 30;
/// Order-bound delivery OTP lifetime.
pub const DELIVERY_OTP_TTL_MINUTES: i64 = 10;

/// Generates a 6-digit one-time code.
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    code.to_string()
}

/// Hex SHA-256 of a code, the only form ever stored.
pub fn hash_otp(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Cash-on-delivery OTP workflows.
#[derive(Clone)]
pub struct CodService<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store + Clone> CodService<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Sends a phone-ownership code. Re-sending replaces any previous
    /// code for the number.
    #[tracing::instrument(skip(self))]
    pub async fn send_otp(&self, phone_raw: &str) -> Result<()> {
        let phone = Phone::parse(phone_raw).map_err(|e| DomainError::Validation(e.to_string()))?;
        let code = generate_otp();

        self.store
            .upsert_phone_verification(&PhoneVerification {
                phone: phone.clone(),
                otp_hash: hash_otp(&code),
                expires_at: Utc::now() + Duration::minutes(PHONE_OTP_TTL_MINUTES),
                verified: false,
            })
            .await?;

        best_effort(
            "phone otp sms",
            self.notifier
                .sms(phone.as_str(), &format!("Your verification code is {code}")),
        )
        .await;
        Ok(())
    }

    /// Verifies a phone-ownership code.
    ///
    /// Idempotent once verified. Success extends the record's validity to
    /// the checkout eligibility window.
    #[tracing::instrument(skip(self, code))]
    pub async fn verify_otp(&self, phone_raw: &str, code: &str) -> Result<()> {
        let phone = Phone::parse(phone_raw).map_err(|e| DomainError::Validation(e.to_string()))?;

        let verification = self
            .store
            .find_phone_verification(&phone)
            .await?
            .ok_or(DomainError::OtpExpired)?;

        if verification.verified {
            return Ok(());
        }
        if verification.otp_hash != hash_otp(code) {
            return Err(DomainError::OtpInvalid);
        }

        self.store
            .upsert_phone_verification(&PhoneVerification {
                verified: true,
                expires_at: Utc::now() + Duration::minutes(VERIFIED_WINDOW_MINUTES),
                ..verification
            })
            .await?;
        Ok(())
    }

    /// Verifies the delivery code for a cash-on-delivery order.
    ///
    /// Order-bound: the code and expiry live on the order, and the phone
    /// must match the order's contact phone. Success sets `cod_verified`,
    /// clears the code, and logs `cod_verified`.
    #[tracing::instrument(skip(self, code))]
    pub async fn verify_delivery_otp(
        &self,
        order_id: OrderId,
        phone_raw: &str,
        code: &str,
    ) -> Result<Order> {
        let phone = Phone::parse(phone_raw).map_err(|e| DomainError::Validation(e.to_string()))?;

        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if !order.payment_method.is_cod() {
            return Err(DomainError::Validation(
                "not a cash-on-delivery order".to_string(),
            ));
        }
        if order.cod_verified {
            return Ok(order);
        }
        if order.shipping_address.phone != phone {
            return Err(DomainError::Unauthorized);
        }

        let expires_at = order
            .cod_otp_expires_at
            .ok_or(DomainError::OtpExpired)?;
        if expires_at < Utc::now() {
            return Err(DomainError::OtpExpired);
        }
        let otp_hash = order.cod_otp_hash.as_deref().ok_or(DomainError::OtpExpired)?;
        if otp_hash != hash_otp(code) {
            return Err(DomainError::OtpInvalid);
        }

        let previous = order.status;
        let mut updated = order;
        updated.cod_verified = true;
        updated.cod_otp_hash = None;
        updated.cod_otp_expires_at = None;
        self.store.update_order(&updated, previous).await?;

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                "cod",
                PaymentEvent::CodVerified,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({}),
            ),
        )
        .await;

        Ok(updated)
    }
}
