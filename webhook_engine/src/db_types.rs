use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use pwg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

//--------------------------------------     EventCode       ---------------------------------------------------------
/// Webhook event codes as reported by the payment provider.
///
/// Codes the gateway does not know are carried verbatim in [`EventCode::Other`] so that they can
/// be parsed, persisted and later resolved to the no-op processor instead of failing at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCode {
    Authorisation,
    Capture,
    CaptureFailed,
    Cancellation,
    Refund,
    RefundFailed,
    OfferClosed,
    OrderClosed,
    ReportAvailable,
    Donation,
    Other(String),
}

impl EventCode {
    pub fn as_str(&self) -> &str {
        match self {
            EventCode::Authorisation => "AUTHORISATION",
            EventCode::Capture => "CAPTURE",
            EventCode::CaptureFailed => "CAPTURE_FAILED",
            EventCode::Cancellation => "CANCELLATION",
            EventCode::Refund => "REFUND",
            EventCode::RefundFailed => "REFUND_FAILED",
            EventCode::OfferClosed => "OFFER_CLOSED",
            EventCode::OrderClosed => "ORDER_CLOSED",
            EventCode::ReportAvailable => "REPORT_AVAILABLE",
            EventCode::Donation => "DONATION",
            EventCode::Other(code) => code.as_str(),
        }
    }
}

impl Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "AUTHORISATION" => Self::Authorisation,
            "CAPTURE" => Self::Capture,
            "CAPTURE_FAILED" => Self::CaptureFailed,
            "CANCELLATION" => Self::Cancellation,
            "REFUND" => Self::Refund,
            "REFUND_FAILED" => Self::RefundFailed,
            "OFFER_CLOSED" => Self::OfferClosed,
            "ORDER_CLOSED" => Self::OrderClosed,
            "REPORT_AVAILABLE" => Self::ReportAvailable,
            "DONATION" => Self::Donation,
            other => Self::Other(other.to_string()),
        };
        Ok(code)
    }
}

impl From<String> for EventCode {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(EventCode::Other(value))
    }
}

impl From<EventCode> for String {
    fn from(value: EventCode) -> Self {
        value.as_str().to_string()
    }
}

//--------------------------------------    PaymentState     ---------------------------------------------------------
/// The webhook module's internal payment-state vocabulary.
///
/// The platform stores transaction states under technical names; the fixed lookup table in
/// [`PaymentState::from_technical_name`] translates them. A state without a mapping is not
/// actionable by the webhook module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Open,
    InProgress,
    Authorized,
    Paid,
    PartiallyPaid,
    Failed,
    Refunded,
    PartiallyRefunded,
    Cancelled,
}

impl PaymentState {
    /// Transaction states a webhook may act on. Transactions in any other state are invisible
    /// to the dispatcher.
    pub const WEBHOOK_RELEVANT: [PaymentState; 7] = [
        PaymentState::Open,
        PaymentState::InProgress,
        PaymentState::Authorized,
        PaymentState::Paid,
        PaymentState::PartiallyPaid,
        PaymentState::Refunded,
        PaymentState::PartiallyRefunded,
    ];

    pub fn from_technical_name(name: &str) -> Option<Self> {
        let state = match name {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "authorized" => Self::Authorized,
            "paid" => Self::Paid,
            "partially_paid" => Self::PartiallyPaid,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            "partially_refunded" => Self::PartiallyRefunded,
            "cancelled" => Self::Cancelled,
            _ => return None,
        };
        Some(state)
    }

    pub fn technical_name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Authorized => "authorized",
            Self::Paid => "paid",
            Self::PartiallyPaid => "partially_paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// The platform's transition table. Transitions not listed here are rejected by
    /// [`crate::traits::TransactionManagement::transition_state`] and must be worked around by
    /// the caller (the refund flow forces a transaction to `Paid` first when needed).
    pub fn can_transition_to(self, target: PaymentState) -> bool {
        use PaymentState::*;
        matches!(
            (self, target),
            (Open, InProgress | Authorized | Paid | Failed | Cancelled)
                | (InProgress, Authorized | Paid | Failed | Cancelled)
                | (Authorized, Paid | Failed | Cancelled)
                | (PartiallyPaid, Paid | Failed)
                | (Paid, Refunded | PartiallyRefunded)
                | (PartiallyPaid, Refunded | PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
                | (Failed, InProgress)
                | (Cancelled, InProgress)
        )
    }
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.technical_name())
    }
}

//--------------------------------------    Notification     ---------------------------------------------------------
/// One inbound webhook event, as stored in the notification store.
///
/// Rows are never deleted. `done` is the terminal processing state; `processing` is the
/// advisory in-flight lock that keeps overlapping dispatcher runs from double-processing.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub psp_reference: String,
    /// For follow-up events (captures, refunds), the reference of the original authorisation.
    pub original_reference: Option<String>,
    /// Correlates the event to an order number on the platform side.
    pub merchant_reference: String,
    pub event_code: EventCode,
    pub success: bool,
    pub payment_method: Option<String>,
    /// Amount in minor units, as reported by the provider.
    pub amount: MinorUnits,
    pub currency: String,
    pub reason: Option<String>,
    /// Whether the event originated from the production environment.
    pub live: bool,
    pub additional_data: HashMap<String, String>,
    pub done: bool,
    pub processing: bool,
    pub scheduled_processing_time: Option<DateTime<Utc>>,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewNotification   ---------------------------------------------------------
/// A webhook event as accepted by the inbound receiver, before it has been persisted.
///
/// Duplicate deliveries are not deduplicated here; every delivery becomes its own row and
/// idempotence is enforced during processing.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub psp_reference: String,
    pub original_reference: Option<String>,
    pub merchant_reference: String,
    pub event_code: EventCode,
    pub success: bool,
    pub payment_method: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub reason: Option<String>,
    pub live: bool,
    pub additional_data: HashMap<String, String>,
    /// The time the event was received by the gateway.
    pub received_at: DateTime<Utc>,
}

impl NewNotification {
    pub fn new(
        psp_reference: impl Into<String>,
        merchant_reference: impl Into<String>,
        event_code: EventCode,
        success: bool,
        amount: MinorUnits,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            psp_reference: psp_reference.into(),
            original_reference: None,
            merchant_reference: merchant_reference.into(),
            event_code,
            success,
            payment_method: None,
            amount,
            currency: currency.into(),
            reason: None,
            live: false,
            additional_data: HashMap::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_original_reference(mut self, reference: impl Into<String>) -> Self {
        self.original_reference = Some(reference.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_additional_data(mut self, data: HashMap<String, String>) -> Self {
        self.additional_data = data;
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
/// A platform order, matched to notifications via its `order_number`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    /// Major-unit decimal total as the storefront records it. Convert with
    /// [`pwg_common::sanitize`] before comparing against notification amounts.
    pub total_amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  OrderTransaction   ---------------------------------------------------------
/// One payment attempt against an order. The `state` column holds the platform's technical
/// state name; map it with [`PaymentState::from_technical_name`] before acting on it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderTransaction {
    pub id: i64,
    pub order_id: i64,
    pub psp_reference: Option<String>,
    pub payment_method: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     Pagination      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_page_size")]
    pub limit: i64,
}

fn default_page_size() -> i64 {
    50
}

impl Default for Pagination {
    fn default() -> Self {
        Self { offset: 0, limit: default_page_size() }
    }
}
