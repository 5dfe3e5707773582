//! The event processor registry.
//!
//! Maps `(event code, success)` to the pure state-transition rule that applies to an order
//! transaction. Processors never touch the database; they are given everything they need in a
//! [`ProcessorContext`] and answer a single question: which state, if any, should the
//! transaction move to?
//!
//! Event codes without a rule resolve to [`EventProcessor::NoOp`]. That is not an error; the
//! provider sends many event types the gateway has no interest in.

use log::warn;
use pwg_common::MinorUnits;

use crate::db_types::{EventCode, PaymentState};

/// Everything a processor may consult when computing a transition.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorContext {
    /// The transaction's current state, already mapped to the internal vocabulary.
    pub current: PaymentState,
    /// The order total in minor units.
    pub transaction_total: MinorUnits,
    /// Cumulative refunded amount in minor units, including the notification being processed.
    pub refunded_total: MinorUnits,
}

impl ProcessorContext {
    pub fn new(current: PaymentState) -> Self {
        Self {
            current,
            transaction_total: MinorUnits::default(),
            refunded_total: MinorUnits::default(),
        }
    }

    pub fn with_refund_amounts(mut self, transaction_total: MinorUnits, refunded_total: MinorUnits) -> Self {
        self.transaction_total = transaction_total;
        self.refunded_total = refunded_total;
        self
    }
}

/// A state-transition rule. Resolved from `(event code, success)` via [`EventProcessor::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventProcessor {
    /// A successful authorisation: the payment went through.
    PaymentConfirmed,
    /// A refused authorisation.
    PaymentFailed,
    /// The shopper abandoned the payment.
    OfferClosed,
    /// A successful (partial or full) refund.
    Refund,
    /// No transition rule applies to this event.
    NoOp,
}

impl EventProcessor {
    pub fn resolve(event_code: &EventCode, success: bool) -> Self {
        match (event_code, success) {
            (EventCode::Authorisation, true) => Self::PaymentConfirmed,
            (EventCode::Authorisation, false) => Self::PaymentFailed,
            (EventCode::OfferClosed, true) => Self::OfferClosed,
            (EventCode::Refund, true) => Self::Refund,
            _ => Self::NoOp,
        }
    }

    /// Computes the state the transaction should move to, or `None` when no transition is
    /// required. Re-running a processor on the state it produced always yields `None`, which is
    /// what makes duplicate webhook deliveries safe.
    pub fn process(&self, ctx: &ProcessorContext) -> Option<PaymentState> {
        match self {
            Self::PaymentConfirmed => (ctx.current != PaymentState::Paid).then_some(PaymentState::Paid),
            Self::PaymentFailed => {
                (ctx.current == PaymentState::InProgress).then_some(PaymentState::Failed)
            },
            Self::OfferClosed => {
                (ctx.current == PaymentState::InProgress).then_some(PaymentState::Failed)
            },
            Self::Refund => refund_target(ctx),
            Self::NoOp => None,
        }
    }
}

/// The refund rule. Compares the cumulative refunded amount against the transaction total, both
/// in minor units, and picks `refunded` or `partially_refunded`. A transaction that is already
/// fully refunded, or already in the computed target state, needs no transition; a transaction
/// in `partially_refunded` can still be promoted to `refunded`.
fn refund_target(ctx: &ProcessorContext) -> Option<PaymentState> {
    if ctx.refunded_total > ctx.transaction_total {
        // Data-consistency signal for operators, not a fault. Do not transition.
        warn!(
            "⚖️ Refunded amount {} exceeds the transaction total {}. Leaving the transaction in '{}'",
            ctx.refunded_total, ctx.transaction_total, ctx.current
        );
        return None;
    }
    let target = if ctx.refunded_total == ctx.transaction_total {
        PaymentState::Refunded
    } else {
        PaymentState::PartiallyRefunded
    };
    if ctx.current == PaymentState::Refunded || ctx.current == target {
        return None;
    }
    Some(target)
}
