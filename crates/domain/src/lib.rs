//! Domain services for the order lifecycle and payment reconciliation.
//!
//! Services are generic over the [`Store`](store::Store) so the same
//! logic runs against the in-memory store in tests and PostgreSQL in
//! production. Payment gateways sit behind [`PaymentProvider`] and
//! outbound messages behind [`Notifier`].

pub mod audit;
pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod notify;
pub mod otp;
pub mod payments;
pub mod sweeps;

pub use audit::log_payment;
pub use checkout::{
    AddressInput, CartItem, CheckoutRequest, CheckoutResponse, CheckoutService,
};
pub use error::{DomainError, Result};
pub use fulfillment::FulfillmentService;
pub use notify::{NoopNotifier, Notifier, NotifyError, RecordingNotifier, SentMessage};
pub use otp::CodService;
pub use payments::{
    HmacGateway, MockProvider, PaymentProvider, PaymentService, RefundReceipt, RemoteOrder,
};
pub use sweeps::SweepService;
