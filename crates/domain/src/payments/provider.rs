//! Payment provider abstraction and the mock implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::Money;

use crate::{DomainError, Result};

/// A payment order created on the provider's side. Its id becomes the
/// order's `payment_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub provider_order_id: String,
    pub amount: Money,
    pub currency: String,
}

/// Receipt for an issued refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
}

/// The payment gateway boundary.
///
/// Signature checks are synchronous and fail closed: any malformed or
/// mismatched input is [`DomainError::InvalidSignature`].
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider label recorded in payment log entries.
    fn name(&self) -> &'static str;

    /// Creates the provider-side payment order for an online checkout.
    async fn create_remote_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<RemoteOrder>;

    /// Verifies a client-supplied payment signature for
    /// `"{payment_ref}|{payment_id}"`.
    fn verify_payment(&self, payment_ref: &str, payment_id: &str, signature: &str) -> Result<()>;

    /// Verifies a webhook signature over the raw request body.
    fn verify_webhook(&self, raw_body: &[u8], signature: &str) -> Result<()>;

    /// Issues a refund against a previously captured payment.
    async fn refund(&self, payment_ref: &str, amount: Money) -> Result<RefundReceipt>;
}

#[derive(Debug, Default)]
struct MockState {
    next_id: AtomicU64,
    refund_calls: AtomicU64,
    fail_on_create: AtomicBool,
    fail_on_refund: AtomicBool,
}

/// Mock provider: accepts every signature and mints deterministic ids.
/// Used in tests and in `mock` payments mode.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to fail remote order creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Configures the provider to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.fail_on_refund.store(fail, Ordering::SeqCst);
    }

    /// Number of refund calls received, declined ones included.
    pub fn refund_calls(&self) -> u64 {
        self.state.refund_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_remote_order(
        &self,
        amount: Money,
        currency: &str,
        _receipt: &str,
    ) -> Result<RemoteOrder> {
        if self.state.fail_on_create.load(Ordering::SeqCst) {
            return Err(DomainError::Provider(
                "mock provider unavailable".to_string(),
            ));
        }
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteOrder {
            provider_order_id: format!("mock_order_{n}"),
            amount,
            currency: currency.to_string(),
        })
    }

    fn verify_payment(&self, _payment_ref: &str, _payment_id: &str, _signature: &str) -> Result<()> {
        Ok(())
    }

    fn verify_webhook(&self, _raw_body: &[u8], _signature: &str) -> Result<()> {
        Ok(())
    }

    async fn refund(&self, _payment_ref: &str, _amount: Money) -> Result<RefundReceipt> {
        self.state.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_on_refund.load(Ordering::SeqCst) {
            return Err(DomainError::Provider("mock refund declined".to_string()));
        }
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RefundReceipt {
            refund_id: format!("mock_refund_{n}"),
        })
    }
}
