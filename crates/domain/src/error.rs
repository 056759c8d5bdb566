use thiserror::Error;

use common::{OrderId, OrderStatus, ProductId};
use store::StoreError;

/// Errors surfaced by the domain services.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request is malformed: empty cart, bad quantity, incomplete
    /// address, invalid phone, and the like.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stock reservation failed for one of the line items.
    #[error("Insufficient stock for product {product_id}")]
    OutOfStock { product_id: ProductId },

    /// The requested status change is not an edge of the transition table.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Payment or webhook signature verification failed.
    #[error("Invalid payment signature")]
    InvalidSignature,

    /// Cash-on-delivery orders can be cancelled but never refunded.
    #[error("Cash-on-delivery orders cannot be refunded")]
    CodNotRefundable,

    /// The guest is over the cash-on-delivery abuse limits.
    #[error("Cash-on-delivery limit exceeded: {0}")]
    CodLimitExceeded(String),

    /// Cash on delivery requires a verified phone number first.
    #[error("Phone number must be verified before cash on delivery")]
    CodVerificationPending,

    /// The verification code has expired (or was never sent).
    #[error("Verification code has expired")]
    OtpExpired,

    /// The verification code does not match.
    #[error("Invalid verification code")]
    OtpInvalid,

    /// The caller does not own this order.
    #[error("Unauthorized")]
    Unauthorized,

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The payment provider rejected or failed an operation.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// A store error that has no more specific domain meaning.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OutOfStock { product_id } => DomainError::OutOfStock { product_id },
            StoreError::ProductNotFound(id) => {
                DomainError::Validation(format!("unknown product: {id}"))
            }
            StoreError::OrderNotFound(id) => DomainError::OrderNotFound(id),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
