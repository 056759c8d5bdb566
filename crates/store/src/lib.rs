//! Persistence layer for the order engine.
//!
//! Record types, the [`Store`] trait, and two implementations:
//! [`MemoryStore`] for tests and database-free deployments, and
//! [`PostgresStore`] backed by sqlx.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    Order, OrderItem, PaymentEvent, PaymentLogEntry, PhoneVerification, Product, ShippingAddress,
    SizeVariant,
};
pub use store::Store;
