use pwg_common::MinorUnits;

use crate::{
    db_types::{Order, OrderTransaction, PaymentState},
    traits::WebhookGatewayError,
};

/// The platform-side order and transaction records the dispatcher acts on, plus the capture and
/// refund bookkeeping the side-effect handlers maintain.
#[allow(async_fn_in_trait)]
pub trait TransactionManagement {
    async fn fetch_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, WebhookGatewayError>;

    /// The first transaction of the order that is in a webhook-relevant state (see
    /// [`PaymentState::WEBHOOK_RELEVANT`]), oldest first. Returns `None` if the order has no
    /// such transaction.
    async fn fetch_webhook_transaction(
        &self,
        order_id: i64,
    ) -> Result<Option<OrderTransaction>, WebhookGatewayError>;

    /// Applies a state transition through the platform's transition validation. Returns
    /// [`WebhookGatewayError::IllegalStateTransition`] when the transition table rejects the
    /// move; callers decide how to work around a rejection.
    async fn transition_state(
        &self,
        transaction_id: i64,
        target: PaymentState,
    ) -> Result<OrderTransaction, WebhookGatewayError>;

    /// Idempotently records a refund against the transaction, keyed by the refund's psp
    /// reference. Returns `false` when the refund was already recorded.
    async fn record_refund(
        &self,
        transaction_id: i64,
        psp_reference: &str,
        amount: MinorUnits,
    ) -> Result<bool, WebhookGatewayError>;

    /// Total refunded against the transaction so far, in minor units.
    async fn refunded_total(&self, transaction_id: i64) -> Result<MinorUnits, WebhookGatewayError>;

    /// Idempotently records a capture against the transaction, keyed by the capture's psp
    /// reference. Returns `false` when the capture was already recorded.
    async fn record_capture(
        &self,
        transaction_id: i64,
        psp_reference: &str,
        amount: MinorUnits,
    ) -> Result<bool, WebhookGatewayError>;

    /// Total captured against the transaction so far, in minor units.
    async fn captured_total(&self, transaction_id: i64) -> Result<MinorUnits, WebhookGatewayError>;
}
