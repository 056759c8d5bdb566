use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{GuestId, OrderId, OrderStatus, Phone, ProductId};

use crate::{Order, PaymentLogEntry, PhoneVerification, Product, Result};

/// The persistence boundary.
///
/// Every mutating call is one atomic unit of work: `create_order` reserves
/// stock for all items and inserts the order all-or-nothing, and the
/// `update_order*` calls compare-and-swap on the order's status so that
/// concurrent conflicting transitions are serialized — the loser gets
/// [`StoreError::StatusConflict`](crate::StoreError::StatusConflict).
///
/// `cod_verified` is monotone: once set it cannot be cleared by a
/// whole-record write, so a writer holding a pre-verification snapshot
/// loses with [`StoreError::StaleWrite`](crate::StoreError::StaleWrite)
/// even when its status check would pass.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short label for the backing implementation, for diagnostics.
    fn backend(&self) -> &'static str;

    // --- products ---

    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>>;

    // --- orders ---

    /// Atomically decrements stock for every line item and inserts the
    /// order. If any product is missing or short, nothing is written and
    /// the error names the failing product.
    async fn create_order(&self, order: &Order) -> Result<()>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Looks an order up by its provider-side payment reference.
    async fn find_order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>>;

    /// Replaces the order record, conditional on its stored status still
    /// being `expected` and on the write not clearing `cod_verified`.
    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()>;

    /// Like [`Store::update_order`], but also returns every line item's
    /// quantity to product stock within the same atomic unit. Used for
    /// cancellation and refund approval.
    async fn update_order_restocking(&self, order: &Order, expected: OrderStatus) -> Result<()>;

    async fn orders_for_guest(&self, guest: GuestId) -> Result<Vec<Order>>;

    // --- sweep queries ---

    /// Orders still in `pending_payment` created before `cutoff`.
    async fn pending_payment_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Unverified cash-on-delivery orders still in `processing` created
    /// before `cutoff`.
    async fn unverified_cod_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;

    // --- COD abuse limits ---

    /// Number of non-cancelled cash-on-delivery orders placed by the
    /// guest since `since`.
    async fn cod_orders_since(&self, guest: GuestId, since: DateTime<Utc>) -> Result<u32>;

    /// True if the guest has a cash-on-delivery order that is still
    /// awaiting delivery verification.
    async fn has_unverified_cod_order(&self, guest: GuestId) -> Result<bool>;

    // --- payment log ---

    async fn append_payment_log(&self, entry: &PaymentLogEntry) -> Result<()>;

    /// Entries for one order, oldest first.
    async fn payment_log_for_order(&self, order_id: OrderId) -> Result<Vec<PaymentLogEntry>>;

    // --- phone verification ---

    async fn upsert_phone_verification(&self, verification: &PhoneVerification) -> Result<()>;

    /// Returns the record for a phone number, or `None` if absent or
    /// expired.
    async fn find_phone_verification(&self, phone: &Phone) -> Result<Option<PhoneVerification>>;
}
