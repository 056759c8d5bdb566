use thiserror::Error;

use common::{OrderId, OrderStatus, ProductId};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional stock decrement failed: the product exists but does
    /// not have enough units left.
    #[error("Insufficient stock for product {product_id}")]
    OutOfStock { product_id: ProductId },

    /// The product was not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A compare-and-swap status update lost the race: the order's status
    /// no longer matches what the caller read.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The write was built from a snapshot taken before the order's
    /// delivery verification landed; committing it would erase
    /// `cod_verified`.
    #[error("Stale write for order {order_id}: delivery verification already recorded")]
    StaleWrite { order_id: OrderId },

    /// A stored value failed validation while being loaded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
