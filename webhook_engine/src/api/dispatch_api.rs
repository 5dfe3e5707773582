//! The webhook dispatcher.
//!
//! The main periodic batch job: it claims every due notification, resolves the order and
//! transaction it refers to, asks the event processor registry for the state transition, runs
//! the event's side effects, and settles the notification as done, rescheduled or abandoned.
//!
//! Failures are isolated per notification. Whatever happens to one row, the pass continues
//! with the next, and nothing escapes the loop.

use std::fmt::{Debug, Display};

use chrono::{DateTime, Duration, Utc};
use log::*;
use pwg_common::sanitize;

use crate::{
    db_types::{EventCode, Notification, OrderTransaction, PaymentState},
    events::{EventProducers, TransactionStateChanged},
    processors::{EventProcessor, ProcessorContext},
    traits::{NotificationManagement, TransactionManagement, WebhookGatewayError},
};

/// Attempts after which a notification is abandoned rather than rescheduled again.
pub const MAX_PROCESSING_ATTEMPTS: i64 = 3;

/// Backoff before retrying a capture that could not be reconciled, per the provider's
/// recommendation for out-of-order follow-up events.
const CAPTURE_RETRY_DELAY: Duration = Duration::minutes(30);

/// Backoff before retrying after an unexpected processing error.
const RETRY_DELAY: Duration = Duration::minutes(15);

/// What happened to a single notification during a dispatcher pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Fully processed and marked done (with or without a state transition).
    Completed,
    /// The event code is not handled by this gateway; marked done without an error.
    Ignored,
    /// Unrecoverable (missing order or transaction, unmapped state); marked done so it is
    /// never retried.
    FailedTerminally,
    /// A transient failure; the notification got a fresh slot in the future.
    Rescheduled,
    /// A transient failure, but the attempt budget is exhausted; marked done.
    Abandoned,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub completed: usize,
    pub ignored: usize,
    pub failed_terminally: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
    /// Notifications whose store bookkeeping itself failed. They stay claimed and are picked
    /// up again by the scheduler's rescue sweep.
    pub store_failures: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.completed
            + self.ignored
            + self.failed_terminally
            + self.rescheduled
            + self.abandoned
            + self.store_failures
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn count(&mut self, outcome: NotificationOutcome) {
        match outcome {
            NotificationOutcome::Completed => self.completed += 1,
            NotificationOutcome::Ignored => self.ignored += 1,
            NotificationOutcome::FailedTerminally => self.failed_terminally += 1,
            NotificationOutcome::Rescheduled => self.rescheduled += 1,
            NotificationOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

impl Display for DispatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} ignored, {} failed terminally, {} rescheduled, {} abandoned, {} \
             store failures",
            self.completed,
            self.ignored,
            self.failed_terminally,
            self.rescheduled,
            self.abandoned,
            self.store_failures
        )
    }
}

pub struct DispatchApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for DispatchApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchApi")
    }
}

impl<B> DispatchApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> DispatchApi<B>
where B: NotificationManagement + TransactionManagement
{
    /// Processes every due notification once and returns the pass summary.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<DispatchSummary, WebhookGatewayError> {
        let due = self.db.fetch_due_notifications(now).await?;
        if !due.is_empty() {
            debug!("📨️ {} notifications due for processing", due.len());
        }
        let mut summary = DispatchSummary::default();
        for notification in due {
            match self.process_notification(&notification, now).await {
                Ok(outcome) => summary.count(outcome),
                Err(e) => {
                    // The store itself failed while settling this notification. Leave the row
                    // as it is; the rescue sweep will make it claimable again.
                    error!(
                        "📨️ Could not update notification {} after processing: {e}",
                        notification.id
                    );
                    summary.store_failures += 1;
                },
            }
        }
        Ok(summary)
    }

    /// Processes a single claimed notification and settles its store record. The returned
    /// error is only ever a store bookkeeping failure; processing failures are settled into
    /// the notification itself.
    pub async fn process_notification(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<NotificationOutcome, WebhookGatewayError> {
        self.db.set_processing(notification.id, true).await?;
        let id = notification.id;
        match self.apply(notification).await {
            Ok(change) => {
                if let Some(event) = change {
                    self.notify_state_changed(event).await;
                }
                self.db.mark_done(id).await?;
                debug!("📨️ Notification {id} processed");
                Ok(NotificationOutcome::Completed)
            },
            Err(WebhookGatewayError::UnrecognizedEvent(code)) => {
                info!("📨️ Ignoring notification {id}: event {code} is not handled by this gateway");
                self.db.mark_done(id).await?;
                Ok(NotificationOutcome::Ignored)
            },
            Err(e) if is_unrecoverable(&e) => {
                // Retrying cannot change the outcome, so stop here.
                warn!("📨️ Notification {id} cannot be processed and will not be retried: {e}");
                self.db.record_error(id, &e.to_string()).await?;
                self.db.mark_done(id).await?;
                Ok(NotificationOutcome::FailedTerminally)
            },
            Err(e) => {
                warn!("📨️ Processing notification {id} failed: {e}");
                let attempts = self.db.record_error(id, &e.to_string()).await?;
                if attempts >= MAX_PROCESSING_ATTEMPTS {
                    warn!("📨️ Notification {id} failed {attempts} times and is being abandoned");
                    self.db.mark_done(id).await?;
                    Ok(NotificationOutcome::Abandoned)
                } else {
                    let slot = now + retry_delay(&e);
                    self.db.set_schedule(id, slot).await?;
                    self.db.set_processing(id, false).await?;
                    debug!("📨️ Notification {id} rescheduled for {slot} (attempt {attempts})");
                    Ok(NotificationOutcome::Rescheduled)
                }
            },
        }
    }

    /// The per-notification pipeline: resolve order and transaction, run side effects, compute
    /// and apply the state transition.
    async fn apply(
        &self,
        notification: &Notification,
    ) -> Result<Option<TransactionStateChanged>, WebhookGatewayError> {
        let order = self
            .db
            .fetch_order_by_number(&notification.merchant_reference)
            .await?
            .ok_or_else(|| WebhookGatewayError::OrderNotFound(notification.merchant_reference.clone()))?;
        let transaction = self
            .db
            .fetch_webhook_transaction(order.id)
            .await?
            .ok_or_else(|| WebhookGatewayError::TransactionNotFound(order.order_number.clone()))?;
        let current = PaymentState::from_technical_name(&transaction.state).ok_or_else(|| {
            WebhookGatewayError::UnmappedState(transaction.id, transaction.state.clone())
        })?;
        // Side effects run before the transition is computed so that refund arithmetic sees
        // this notification's bookkeeping. Every bookkeeping insert is idempotent by psp
        // reference, which is what makes re-delivery and retry safe.
        self.run_side_effects(notification, &transaction, current).await?;
        let processor = EventProcessor::resolve(&notification.event_code, notification.success);
        let ctx = match processor {
            EventProcessor::Refund => {
                let refunded = self.db.refunded_total(transaction.id).await?;
                let total = sanitize(order.total_amount, &order.currency);
                ProcessorContext::new(current).with_refund_amounts(total, refunded)
            },
            _ => ProcessorContext::new(current),
        };
        match processor.process(&ctx) {
            Some(target) => {
                self.apply_transition(&transaction, target).await?;
                info!(
                    "📨️ Transaction {} (order {}) moved from '{current}' to '{target}'",
                    transaction.id, order.order_number
                );
                Ok(Some(TransactionStateChanged {
                    transaction_id: transaction.id,
                    order_number: order.order_number,
                    psp_reference: notification.psp_reference.clone(),
                    from: current,
                    to: target,
                }))
            },
            None => {
                debug!(
                    "📨️ No transition required for transaction {} (order {}) in state '{current}'",
                    transaction.id, order.order_number
                );
                Ok(None)
            },
        }
    }

    /// Applies the transition through the platform state machine. When the machine refuses a
    /// refund target (the transaction was authorized but never moved to paid), the transaction
    /// is forced to `paid` first and the refund transition retried once.
    async fn apply_transition(
        &self,
        transaction: &OrderTransaction,
        target: PaymentState,
    ) -> Result<(), WebhookGatewayError> {
        match self.db.transition_state(transaction.id, target).await {
            Ok(_) => Ok(()),
            Err(WebhookGatewayError::IllegalStateTransition { from, .. })
                if matches!(target, PaymentState::Refunded | PaymentState::PartiallyRefunded) =>
            {
                debug!(
                    "📨️ Direct transition from '{from}' to '{target}' refused for transaction \
                     {}; forcing it to 'paid' first",
                    transaction.id
                );
                self.db.transition_state(transaction.id, PaymentState::Paid).await?;
                self.db.transition_state(transaction.id, target).await?;
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// Event-specific side effects. Events outside the handled set surface
    /// [`WebhookGatewayError::UnrecognizedEvent`], which the caller settles as done at info
    /// level; that is the expected path for event codes the gateway deliberately ignores.
    async fn run_side_effects(
        &self,
        notification: &Notification,
        transaction: &OrderTransaction,
        current: PaymentState,
    ) -> Result<(), WebhookGatewayError> {
        match &notification.event_code {
            EventCode::Authorisation | EventCode::OfferClosed | EventCode::Cancellation => Ok(()),
            EventCode::Capture => self.reconcile_capture(notification, transaction, current).await,
            EventCode::Refund if notification.success => {
                self.db
                    .record_refund(transaction.id, &notification.psp_reference, notification.amount)
                    .await?;
                Ok(())
            },
            EventCode::Refund => Ok(()),
            EventCode::CaptureFailed | EventCode::RefundFailed => {
                warn!(
                    "📨️ The provider reported a failed follow-up ({}) for transaction {}: {}",
                    notification.event_code,
                    transaction.id,
                    notification.reason.as_deref().unwrap_or("no reason given")
                );
                Ok(())
            },
            code => Err(WebhookGatewayError::UnrecognizedEvent(code.to_string())),
        }
    }

    /// CAPTURE bookkeeping. A capture that arrives before its authorisation has been applied
    /// cannot be reconciled yet; that is surfaced as a capture error so the notification is
    /// retried with the provider backoff instead of being dropped.
    async fn reconcile_capture(
        &self,
        notification: &Notification,
        transaction: &OrderTransaction,
        current: PaymentState,
    ) -> Result<(), WebhookGatewayError> {
        if !notification.success {
            debug!(
                "📨️ Capture for transaction {} reported as unsuccessful: {}",
                transaction.id,
                notification.reason.as_deref().unwrap_or("no reason given")
            );
            return Ok(());
        }
        if !matches!(
            current,
            PaymentState::Authorized | PaymentState::Paid | PaymentState::PartiallyPaid
        ) {
            return Err(WebhookGatewayError::CaptureError(format!(
                "transaction {} is still '{current}'; the authorisation has not landed yet",
                transaction.id
            )));
        }
        self.db
            .record_capture(transaction.id, &notification.psp_reference, notification.amount)
            .await?;
        let captured = self.db.captured_total(transaction.id).await?;
        debug!("📨️ Transaction {} now has {captured} captured in total", transaction.id);
        Ok(())
    }

    async fn notify_state_changed(&self, event: TransactionStateChanged) {
        for producer in &self.producers.state_changed_producer {
            trace!("📨️ Notifying state-change hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

fn is_unrecoverable(e: &WebhookGatewayError) -> bool {
    matches!(
        e,
        WebhookGatewayError::OrderNotFound(_)
            | WebhookGatewayError::TransactionNotFound(_)
            | WebhookGatewayError::UnmappedState(_, _)
    )
}

fn retry_delay(e: &WebhookGatewayError) -> Duration {
    match e {
        WebhookGatewayError::CaptureError(_) => CAPTURE_RETRY_DELAY,
        _ => RETRY_DELAY,
    }
}
