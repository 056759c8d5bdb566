//! Payment audit log helper.

use store::{PaymentLogEntry, Store};

/// Appends an audit entry outside the status transaction.
///
/// Audit failures never roll back a financial transition; they are logged
/// at `warn` and dropped.
pub async fn log_payment<S: Store>(store: &S, entry: PaymentLogEntry) {
    if let Err(e) = store.append_payment_log(&entry).await {
        tracing::warn!(
            order_id = %entry.order_id,
            event = %entry.event,
            error = %e,
            "failed to append payment log entry"
        );
    }
}
