//! Admin fulfillment transitions and the refund/cancel workflow.

use std::sync::Arc;

use chrono::Utc;

use common::{GuestId, OrderId, OrderStatus, PaymentMethod};
use store::{Order, PaymentEvent, PaymentLogEntry, Store};

use crate::{
    DomainError, Result,
    audit::log_payment,
    notify::{Notifier, best_effort},
    payments::PaymentProvider,
};

/// Fulfillment and refund operations.
#[derive(Clone)]
pub struct FulfillmentService<S> {
    store: S,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store + Clone> FulfillmentService<S> {
    pub fn new(store: S, provider: Arc<dyn PaymentProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            provider,
            notifier,
        }
    }

    /// Moves an order along the fulfillment path.
    ///
    /// `next` must be `processing`, `shipped`, or `delivered`; the
    /// transition table decides whether the move is legal from the
    /// order's current status.
    #[tracing::instrument(skip(self))]
    pub async fn admin_transition(&self, order_id: OrderId, next: OrderStatus) -> Result<Order> {
        if !matches!(
            next,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(DomainError::Validation(format!(
                "{next} is not an admin fulfillment status"
            )));
        }

        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        let previous = order.status;
        if !previous.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        let now = Utc::now();
        let mut updated = order;
        updated.status = next;
        match next {
            OrderStatus::Processing => updated.processing_at = Some(now),
            OrderStatus::Shipped => updated.shipped_at = Some(now),
            OrderStatus::Delivered => updated.delivered_at = Some(now),
            _ => {}
        }
        self.store.update_order(&updated, previous).await?;

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                self.provider.name(),
                PaymentEvent::StatusChanged,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "from": previous, "to": next }),
            ),
        )
        .await;

        match next {
            OrderStatus::Shipped => {
                best_effort(
                    "shipped sms",
                    self.notifier.sms(
                        updated.shipping_address.phone.as_str(),
                        &format!("Your order {} has been shipped", updated.id),
                    ),
                )
                .await;
            }
            OrderStatus::Delivered => {
                best_effort(
                    "delivered sms",
                    self.notifier.sms(
                        updated.shipping_address.phone.as_str(),
                        &format!("Your order {} has been delivered", updated.id),
                    ),
                )
                .await;
            }
            _ => {}
        }

        Ok(updated)
    }

    /// Guest-initiated cancellation or refund request.
    ///
    /// Unpaid orders and cash-on-delivery orders still in `processing`
    /// are cancelled outright with stock restoration. Paid online orders
    /// enter the refund review queue. Cash-on-delivery orders that have
    /// shipped can no longer be cancelled or refunded.
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_refund_or_cancel(
        &self,
        order_id: OrderId,
        guest: GuestId,
        reason: Option<String>,
    ) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.guest_id != guest {
            return Err(DomainError::Unauthorized);
        }

        let reason = reason.unwrap_or_else(|| "user_cancelled".to_string());
        match (order.payment_method, order.status) {
            (_, OrderStatus::PendingPayment | OrderStatus::PaymentFailed) => {
                self.cancel(order, reason).await
            }
            (PaymentMethod::Cod, OrderStatus::Processing) => self.cancel(order, reason).await,
            (PaymentMethod::Cod, OrderStatus::Shipped | OrderStatus::Delivered) => {
                Err(DomainError::CodNotRefundable)
            }
            (PaymentMethod::Online, OrderStatus::Paid | OrderStatus::Processing) => {
                let previous = order.status;
                let mut updated = order;
                updated.status = OrderStatus::RefundPending;
                updated.cancel_reason = Some(reason.clone());
                self.store.update_order(&updated, previous).await?;

                log_payment(
                    &self.store,
                    PaymentLogEntry::new(
                        updated.id,
                        self.provider.name(),
                        PaymentEvent::RefundRequested,
                        updated.total,
                        updated.currency.clone(),
                        serde_json::json!({ "reason": reason }),
                    ),
                )
                .await;
                Ok(updated)
            }
            (PaymentMethod::Online, OrderStatus::RefundPending) => Ok(order),
            (_, from) => Err(DomainError::InvalidTransition {
                from,
                to: OrderStatus::Cancelled,
            }),
        }
    }

    /// Approves a pending refund: claims the `refunded` transition, issues
    /// the provider refund, then restores stock.
    ///
    /// The compare-and-swap to `refunded` happens before the provider call,
    /// so of two concurrent approvals only the CAS winner ever reaches the
    /// provider; the loser fails its guard without side effects. If the
    /// provider declines, the claim is released back to `refund_pending`.
    #[tracing::instrument(skip(self))]
    pub async fn approve_refund(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.payment_method.is_cod() {
            return Err(DomainError::CodNotRefundable);
        }
        if order.status != OrderStatus::RefundPending {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            });
        }

        let payment_ref = order.payment_ref.clone().ok_or_else(|| {
            DomainError::Validation("order has no payment reference to refund".to_string())
        })?;

        let mut updated = order;
        updated.status = OrderStatus::Refunded;
        updated.refunded_at = Some(Utc::now());
        self.store
            .update_order(&updated, OrderStatus::RefundPending)
            .await?;

        let receipt = match self.provider.refund(&payment_ref, updated.total).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // Release the claim so the approval can be retried.
                let mut reverted = updated.clone();
                reverted.status = OrderStatus::RefundPending;
                reverted.refunded_at = None;
                self.store
                    .update_order(&reverted, OrderStatus::Refunded)
                    .await?;
                return Err(e);
            }
        };

        if !updated.stock_restored {
            updated.stock_restored = true;
            self.store
                .update_order_restocking(&updated, OrderStatus::Refunded)
                .await?;
        }
        metrics::counter!("refunds_approved_total").increment(1);

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                self.provider.name(),
                PaymentEvent::RefundApproved,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "refund_id": receipt.refund_id }),
            ),
        )
        .await;

        best_effort(
            "refund sms",
            self.notifier.sms(
                updated.shipping_address.phone.as_str(),
                &format!("Your refund for order {} has been approved", updated.id),
            ),
        )
        .await;

        Ok(updated)
    }

    /// Rejects a pending refund, reverting to where the order was:
    /// `processing` if fulfillment had started, otherwise `paid`.
    #[tracing::instrument(skip(self))]
    pub async fn reject_refund(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::RefundPending {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        let revert_to = if order.processing_at.is_some() {
            OrderStatus::Processing
        } else {
            OrderStatus::Paid
        };

        let mut updated = order;
        updated.status = revert_to;
        self.store
            .update_order(&updated, OrderStatus::RefundPending)
            .await?;

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                self.provider.name(),
                PaymentEvent::RefundRejected,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "reverted_to": revert_to }),
            ),
        )
        .await;

        Ok(updated)
    }

    async fn cancel(&self, order: Order, reason: String) -> Result<Order> {
        let previous = order.status;
        let mut updated = order;
        updated.status = OrderStatus::Cancelled;
        updated.cancelled_at = Some(Utc::now());
        updated.cancel_reason = Some(reason.clone());

        if !updated.stock_restored {
            updated.stock_restored = true;
            self.store
                .update_order_restocking(&updated, previous)
                .await?;
        } else {
            self.store.update_order(&updated, previous).await?;
        }

        log_payment(
            &self.store,
            PaymentLogEntry::new(
                updated.id,
                self.provider.name(),
                PaymentEvent::Cancelled,
                updated.total,
                updated.currency.clone(),
                serde_json::json!({ "reason": reason }),
            ),
        )
        .await;

        Ok(updated)
    }
}
