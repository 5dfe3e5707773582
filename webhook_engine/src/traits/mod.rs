//! Repository traits for the webhook engine.
//!
//! These traits expose exactly the query shapes the receiver, scheduler and dispatcher use.
//! There is deliberately no generic criteria engine; a backend only has to answer the handful
//! of questions the processing loop actually asks.

mod notification_management;
mod transaction_management;

use thiserror::Error;

pub use notification_management::NotificationManagement;
pub use transaction_management::TransactionManagement;

use crate::db_types::PaymentState;

#[derive(Debug, Clone, Error)]
pub enum WebhookGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested notification (id {0}) does not exist")]
    NotificationNotFound(i64),
    #[error("No order matches merchant reference {0}")]
    OrderNotFound(String),
    #[error("Order {0} has no transaction in a webhook-relevant state")]
    TransactionNotFound(String),
    #[error("Transaction {0} is in state '{1}', which has no webhook state mapping")]
    UnmappedState(i64, String),
    #[error("Illegal payment state transition from {from} to {to}")]
    IllegalStateTransition { from: PaymentState, to: PaymentState },
    #[error("Capture could not be reconciled: {0}")]
    CaptureError(String),
    #[error("Event {0} is not handled by this gateway")]
    UnrecognizedEvent(String),
}

impl From<sqlx::Error> for WebhookGatewayError {
    fn from(e: sqlx::Error) -> Self {
        WebhookGatewayError::DatabaseError(e.to_string())
    }
}
