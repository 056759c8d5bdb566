//! Reconciliation sweeps.
//!
//! Two periodic cleanups keep reserved stock from leaking: pending online
//! orders whose payment never arrived, and cash-on-delivery orders the
//! customer never verified. Each order is its own atomic unit; losing a
//! status race to a concurrent webhook or admin action just skips that
//! order.

use chrono::{Duration, Utc};

use common::OrderStatus;
use store::{Order, PaymentEvent, PaymentLogEntry, Store, StoreError};

use crate::{Result, audit::log_payment};

/// How long an online order may sit unpaid before cancellation.
pub const PAYMENT_TIMEOUT_MINUTES: i64 = 30;
/// How long an unverified cash-on-delivery order may sit before
/// cancellation.
pub const COD_TIMEOUT_HOURS: i64 = 48;

/// Timeout reconciliation sweeps.
#[derive(Clone)]
pub struct SweepService<S> {
    store: S,
}

impl<S: Store + Clone> SweepService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cancels online orders stuck in `pending_payment` past the payment
    /// timeout. Returns the number cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn run_payment_timeout_sweep(&self) -> Result<u32> {
        let cutoff = Utc::now() - Duration::minutes(PAYMENT_TIMEOUT_MINUTES);
        let stale = self.store.pending_payment_older_than(cutoff).await?;
        let cancelled = self
            .cancel_all(stale, OrderStatus::PendingPayment, "payment_timeout")
            .await;
        metrics::counter!("sweep_payment_timeout_cancelled_total").increment(u64::from(cancelled));
        Ok(cancelled)
    }

    /// Cancels unverified cash-on-delivery orders past the COD timeout.
    /// Returns the number cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn run_cod_timeout_sweep(&self) -> Result<u32> {
        let cutoff = Utc::now() - Duration::hours(COD_TIMEOUT_HOURS);
        let stale = self.store.unverified_cod_older_than(cutoff).await?;
        let cancelled = self
            .cancel_all(stale, OrderStatus::Processing, "cod_timeout")
            .await;
        metrics::counter!("sweep_cod_timeout_cancelled_total").increment(u64::from(cancelled));
        Ok(cancelled)
    }

    async fn cancel_all(&self, orders: Vec<Order>, expected: OrderStatus, reason: &str) -> u32 {
        let mut cancelled = 0;
        for order in orders {
            let order_id = order.id;
            match self.cancel_one(order, expected, reason).await {
                Ok(()) => cancelled += 1,
                Err(crate::DomainError::Store(
                    StoreError::StatusConflict { .. } | StoreError::StaleWrite { .. },
                )) => {
                    tracing::debug!(order_id = %order_id, "sweep lost order race, skipping");
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "sweep failed to cancel order");
                }
            }
        }
        cancelled
    }

    async fn cancel_one(&self, order: Order, expected: OrderStatus, reason: &str) -> Result<()> {
        let mut updated = order;
        updated.status = OrderStatus::Cancelled;
        updated.cancelled_at = Some(Utc::now());
        updated.cancel_reason = Some(reason.to_string());

        if !updated.stock_restored {
            updated.stock_restored = true;
            self.store
                .update_order_restocking(&updated, expected)
                .await?;
        } else {
            self.store.update_order(&updated, expected).await?;
        }

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                "sweep",
                PaymentEvent::Cancelled,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "reason": reason }),
            ),
        )
        .await;
        Ok(())
    }
}
