//! Order lifecycle vocabulary: the status state machine and payment method.

use serde::{Deserialize, Serialize};

/// The lifecycle state of an order.
///
/// ```text
/// pending_payment ──┬──► paid ──► processing ──► shipped ──► delivered
///        │          │     │           │
///        ▼          │     └─────┬─────┴──► refund_pending ──► refunded
/// payment_failed ───┘           │                  │
///        │                      │                  └──► (revert)
///        └──────────┬───────────┘
///                   ▼
///               cancelled
/// ```
///
/// `cancelled`, `refunded`, and `delivered` are terminal. Every status
/// write is gated by [`OrderStatus::can_transition_to`]; nothing mutates
/// the field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting online payment.
    #[default]
    PendingPayment,

    /// Payment verification failed; retryable.
    PaymentFailed,

    /// Payment confirmed.
    Paid,

    /// Being fulfilled. Initial state for cash-on-delivery orders.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Delivered to the customer (terminal).
    Delivered,

    /// Customer requested a refund, awaiting admin review.
    RefundPending,

    /// Refund approved and stock restored (terminal).
    Refunded,

    /// Cancelled by the customer, an admin, or a timeout sweep (terminal).
    Cancelled,
}

impl OrderStatus {
    /// The transition table. Returns true when moving from `self` to
    /// `next` is a legal edge; everything else must be rejected.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid)
                | (PendingPayment, PaymentFailed)
                | (PendingPayment, Cancelled)
                | (PaymentFailed, Paid)
                | (PaymentFailed, Cancelled)
                | (Paid, Processing)
                | (Paid, RefundPending)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, RefundPending)
                | (Shipped, Delivered)
                | (RefundPending, Refunded)
                | (RefundPending, Processing)
                | (RefundPending, Paid)
        )
    }

    /// Returns true if this is a terminal state (no outbound edges).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Refunded | OrderStatus::Delivered
        )
    }

    /// Returns true once payment has been confirmed (used for idempotent
    /// verification: a repeated verify call on any of these is a no-op
    /// success).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Returns the status name in its wire/storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::RefundPending => "refund_pending",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// All states, for exhaustive guard checks.
    pub fn all() -> [OrderStatus; 9] {
        [
            OrderStatus::PendingPayment,
            OrderStatus::PaymentFailed,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::RefundPending,
            OrderStatus::Refunded,
            OrderStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// How an order is paid. Fixed at creation; determines which lifecycle
/// sub-flow applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Online payment through the gateway.
    Online,

    /// Cash on delivery, gated by phone OTP verification.
    Cod,
}

impl PaymentMethod {
    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }

    /// Provider label used in payment log entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cod => "cod",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
