use serde::{Deserialize, Serialize};

use crate::db_types::PaymentState;

/// Emitted after the dispatcher has applied a state transition to an order transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStateChanged {
    pub transaction_id: i64,
    pub order_number: String,
    pub psp_reference: String,
    pub from: PaymentState,
    pub to: PaymentState,
}
