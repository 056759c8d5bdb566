//! Payment verification and webhook reconciliation.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use common::OrderStatus;
use store::{Order, PaymentEvent, PaymentLogEntry, Store, StoreError};

use crate::{
    DomainError, Result,
    audit::log_payment,
    notify::{Notifier, best_effort},
};

use super::provider::PaymentProvider;

/// Gateway webhook envelope:
/// `{"event": "...", "payload": {"payment": {"entity": {...}}}}`.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: PaymentWrapper,
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    /// The provider-side order id, i.e. our `payment_ref`.
    order_id: String,
    /// The provider-side payment id.
    id: String,
}

/// Verifies payments and reconciles webhook deliveries.
#[derive(Clone)]
pub struct PaymentService<S> {
    store: S,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store + Clone> PaymentService<S> {
    pub fn new(store: S, provider: Arc<dyn PaymentProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            provider,
            notifier,
        }
    }

    /// Verifies a client-reported payment for an order.
    ///
    /// Idempotent: an order that is already paid (or further along) is a
    /// success with no new log entry. A bad signature moves a pending
    /// order to `payment_failed` and fails closed.
    #[tracing::instrument(skip(self, signature))]
    pub async fn verify_payment(
        &self,
        order_id: common::OrderId,
        payment_id: &str,
        signature: &str,
    ) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.status.is_settled() {
            return Ok(order);
        }

        let payment_ref = order
            .payment_ref
            .clone()
            .ok_or_else(|| DomainError::Validation("order has no payment reference".to_string()))?;

        match self
            .provider
            .verify_payment(&payment_ref, payment_id, signature)
        {
            Ok(()) => {
                metrics::counter!("payments_verified_total").increment(1);
                self.mark_paid(order, payment_id).await
            }
            Err(e) => {
                metrics::counter!("payments_failed_total").increment(1);
                self.mark_failed(order, payment_id).await?;
                Err(e)
            }
        }
    }

    /// Handles a gateway webhook delivery.
    ///
    /// The signature covers the raw body with the webhook secret.
    /// Duplicate and out-of-order deliveries are tolerated: a
    /// `payment.captured` for an already-paid order is a no-op, and one
    /// for an order a sweep has since cancelled is logged and dropped.
    #[tracing::instrument(skip(self, raw_body, signature))]
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<()> {
        self.provider.verify_webhook(raw_body, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| DomainError::Validation(format!("malformed webhook body: {e}")))?;
        let entity = envelope.payload.payment.entity;

        let Some(order) = self
            .store
            .find_order_by_payment_ref(&entity.order_id)
            .await?
        else {
            tracing::warn!(payment_ref = %entity.order_id, "webhook for unknown payment reference");
            return Ok(());
        };

        match envelope.event.as_str() {
            "payment.captured" => {
                if order.status.is_settled() {
                    return Ok(());
                }
                if !order.status.can_transition_to(OrderStatus::Paid) {
                    tracing::warn!(
                        order_id = %order.id,
                        status = %order.status,
                        "dropping payment.captured for order no longer payable"
                    );
                    return Ok(());
                }
                self.mark_paid(order, &entity.id).await?;
                Ok(())
            }
            "payment.failed" => {
                if order.status == OrderStatus::PendingPayment {
                    self.mark_failed(order, &entity.id).await?;
                }
                Ok(())
            }
            other => {
                tracing::debug!(event = other, "ignoring webhook event");
                Ok(())
            }
        }
    }

    async fn mark_paid(&self, order: Order, payment_id: &str) -> Result<Order> {
        let previous = order.status;
        if !previous.can_transition_to(OrderStatus::Paid) {
            return Err(DomainError::InvalidTransition {
                from: previous,
                to: OrderStatus::Paid,
            });
        }

        let mut updated = order;
        updated.status = OrderStatus::Paid;
        updated.paid_at = Some(Utc::now());

        match self.store.update_order(&updated, previous).await {
            Ok(()) => {}
            Err(StoreError::StatusConflict { .. }) => {
                // Lost the race; if the winner settled the payment this
                // call is still a success with no duplicate log entry.
                let current = self
                    .store
                    .find_order(updated.id)
                    .await?
                    .ok_or(DomainError::OrderNotFound(updated.id))?;
                if current.status.is_settled() {
                    return Ok(current);
                }
                return Err(DomainError::InvalidTransition {
                    from: current.status,
                    to: OrderStatus::Paid,
                });
            }
            Err(e) => return Err(e.into()),
        }

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                self.provider.name(),
                PaymentEvent::Success,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "payment_id": payment_id }),
            ),
        )
        .await;

        best_effort("invoice email", self.notifier.invoice_email(&updated)).await;
        Ok(updated)
    }

    async fn mark_failed(&self, order: Order, payment_id: &str) -> Result<()> {
        if order.status == OrderStatus::PendingPayment {
            let mut updated = order.clone();
            updated.status = OrderStatus::PaymentFailed;
            match self
                .store
                .update_order(&updated, OrderStatus::PendingPayment)
                .await
            {
                Ok(()) | Err(StoreError::StatusConflict { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                order.id,
                self.provider.name(),
                PaymentEvent::Failed,
                order.total,
                order.currency.clone(),
                serde_json::json!({ "payment_id": payment_id }),
            ),
        )
        .await;
        Ok(())
    }
}
