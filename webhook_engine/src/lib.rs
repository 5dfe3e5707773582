//! Payment Webhook Engine
//!
//! This library is the core of the payment webhook gateway: it receives the payment provider's
//! asynchronous notifications from the HTTP layer, stores them durably, schedules them for
//! delayed processing, and drives order-transaction state transitions from them with
//! at-least-once, idempotent semantics.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). The notification store, the
//!    platform-owned order/transaction records the dispatcher acts on, and the refund/capture
//!    bookkeeping tables all live here. You should never need to access the database directly;
//!    use the public APIs instead. The exception is the data types, which are defined in
//!    [`db_types`] and are public.
//! 2. The processing APIs ([`mod@api`]): the [`SchedulerApi`] that assigns processing slots,
//!    the [`DispatchApi`] that runs the periodic processing pass, and the [`NotificationApi`]
//!    used by the inbound receiver and the admin surface. All are generic over the repository
//!    traits in [`traits`], so alternative backends only need to implement those.
//! 3. The pure state-transition logic ([`processors`]): the event processor registry that maps
//!    `(event code, success)` to a target payment state without any I/O.
//!
//! The engine also emits a [`events::TransactionStateChanged`] event for every applied
//! transition. A small actor-style hook system lets embedders subscribe to these.

pub mod db_types;
pub mod events;
pub mod processors;
pub mod traits;

mod api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    dispatch_api::{DispatchApi, DispatchSummary, NotificationOutcome},
    notification_api::NotificationApi,
    scheduler_api::{SchedulerApi, ScheduleSummary},
};
