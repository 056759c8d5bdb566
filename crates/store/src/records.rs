//! Persistent record types.
//!
//! These are plain data structs; all invariants (state machine guards,
//! pricing, OTP handling) live in the domain services, and all mutation
//! goes through the [`Store`](crate::Store) trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{GuestId, Money, OrderId, OrderStatus, PaymentMethod, Phone, ProductId};

/// A sellable product with its live stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
}

/// Apparel size variant on a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeVariant {
    Xs,
    S,
    M,
    L,
    Xl,
}

/// A line item, snapshotted at order creation. `name` and `unit_price`
/// are copied from the product so later catalog edits never change what
/// the customer agreed to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub size: Option<SizeVariant>,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Shipping destination and contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: Phone,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The order aggregate. Never deleted; `status` is only written through
/// the store's compare-and-swap updates, guarded by the transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub guest_id: GuestId,
    pub items: Vec<OrderItem>,

    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
    pub currency: String,

    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// Provider-side order id for online payments.
    pub payment_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    pub cod_verified: bool,
    pub cod_otp_hash: Option<String>,
    pub cod_otp_expires_at: Option<DateTime<Utc>>,

    pub shipping_address: ShippingAddress,

    pub cancel_reason: Option<String>,
    /// Set the first time reserved stock is returned to the catalog;
    /// checked inside the same atomic unit as the status write so
    /// restoration happens at most once.
    pub stock_restored: bool,

    pub created_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

/// The kind of a payment-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    Created,
    Success,
    Failed,
    Cancelled,
    CodCreated,
    CodVerified,
    RefundRequested,
    RefundApproved,
    RefundRejected,
    StatusChanged,
}

impl PaymentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEvent::Created => "created",
            PaymentEvent::Success => "success",
            PaymentEvent::Failed => "failed",
            PaymentEvent::Cancelled => "cancelled",
            PaymentEvent::CodCreated => "cod_created",
            PaymentEvent::CodVerified => "cod_verified",
            PaymentEvent::RefundRequested => "refund_requested",
            PaymentEvent::RefundApproved => "refund_approved",
            PaymentEvent::RefundRejected => "refund_rejected",
            PaymentEvent::StatusChanged => "status_changed",
        }
    }
}

impl std::fmt::Display for PaymentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record for everything that happens to an order's
/// money: creation, verification outcomes, refund workflow, admin moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLogEntry {
    pub id: Uuid,
    pub order_id: OrderId,
    pub provider: String,
    pub event: PaymentEvent,
    pub amount: Money,
    pub currency: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentLogEntry {
    pub fn new(
        order_id: OrderId,
        provider: impl Into<String>,
        event: PaymentEvent,
        amount: Money,
        currency: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider: provider.into(),
            event,
            amount,
            currency: currency.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// A phone OTP record, keyed by normalized phone number. Expired records
/// are treated as absent by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneVerification {
    pub phone: Phone,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}
