//! Payment provider abstraction, verification, and webhook handling.

pub mod gateway;
pub mod provider;
pub mod service;

pub use gateway::{HmacGateway, sign};
pub use provider::{MockProvider, PaymentProvider, RefundReceipt, RemoteOrder};
pub use service::PaymentService;
