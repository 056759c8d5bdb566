//! Notification abstraction.
//!
//! Email and SMS sending is an external collaborator; the services only
//! ever call these best-effort and swallow failures with a `warn` log, so
//! a broken sender can never break checkout or a payment transition.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use common::OrderId;
use store::Order;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Outbound customer notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Order confirmation email.
    async fn order_email(&self, order: &Order) -> Result<(), NotifyError>;

    /// Payment invoice email.
    async fn invoice_email(&self, order: &Order) -> Result<(), NotifyError>;

    /// Text message to a phone number (canonical form).
    async fn sms(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

/// Production default when no real senders are wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn order_email(&self, _order: &Order) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn invoice_email(&self, _order: &Order) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn sms(&self, _to: &str, _body: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A message captured by the recording test double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    OrderEmail(OrderId),
    InvoiceEmail(OrderId),
    Sms { to: String, body: String },
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<SentMessage>,
    fail_on_sms: bool,
}

/// Recording notifier for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail SMS sends.
    pub fn set_fail_on_sms(&self, fail: bool) {
        self.state.write().unwrap().fail_on_sms = fail;
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.read().unwrap().sent.clone()
    }

    /// SMS messages sent so far as `(to, body)` pairs.
    pub fn sms_messages(&self) -> Vec<(String, String)> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter_map(|m| match m {
                SentMessage::Sms { to, body } => Some((to.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_email(&self, order: &Order) -> Result<(), NotifyError> {
        self.state
            .write()
            .unwrap()
            .sent
            .push(SentMessage::OrderEmail(order.id));
        Ok(())
    }

    async fn invoice_email(&self, order: &Order) -> Result<(), NotifyError> {
        self.state
            .write()
            .unwrap()
            .sent
            .push(SentMessage::InvoiceEmail(order.id));
        Ok(())
    }

    async fn sms(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_sms {
            return Err(NotifyError("sms gateway unavailable".to_string()));
        }
        state.sent.push(SentMessage::Sms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Awaits a notification and downgrades any failure to a `warn` log.
pub(crate) async fn best_effort<F>(what: &str, fut: F)
where
    F: std::future::Future<Output = Result<(), NotifyError>>,
{
    if let Err(e) = fut.await {
        tracing::warn!(error = %e, "{what} notification failed");
    }
}
