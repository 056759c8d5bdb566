//! Shared value types for the storefront order engine.
//!
//! Everything here is a plain value: identifiers, money, normalized phone
//! numbers, and the order lifecycle vocabulary. No I/O, no behavior beyond
//! validation and the status transition table.

pub mod phone;
pub mod status;
pub mod types;

pub use phone::{Phone, PhoneError};
pub use status::{OrderStatus, PaymentMethod};
pub use types::{GuestId, Money, OrderId, ProductId};
