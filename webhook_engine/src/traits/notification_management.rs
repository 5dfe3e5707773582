use chrono::{DateTime, Duration, Utc};

use crate::{
    db_types::{NewNotification, Notification, Pagination},
    traits::WebhookGatewayError,
};

/// Durable store operations for inbound webhook notifications.
///
/// All time comparisons take the caller-supplied `now` so that scheduling and recovery logic
/// stay testable. Notifications are never deleted; `done = true` is the terminal state.
#[allow(async_fn_in_trait)]
pub trait NotificationManagement {
    /// Persists a freshly received notification. Duplicate deliveries of the same
    /// `(psp_reference, event_code)` pair each create a new row by design; de-duplication
    /// happens logically during processing.
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, WebhookGatewayError>;

    async fn fetch_notification(&self, id: i64) -> Result<Option<Notification>, WebhookGatewayError>;

    /// Notifications for the admin listing, newest first.
    async fn fetch_notifications(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<Notification>, WebhookGatewayError>;

    /// Notifications that have not been assigned a processing slot yet.
    async fn fetch_unscheduled_notifications(&self) -> Result<Vec<Notification>, WebhookGatewayError>;

    /// Due, unfinished, unclaimed notifications: `scheduled_processing_time <= now`, not done,
    /// not processing. Excluding `processing` rows is what keeps overlapping dispatcher runs
    /// from double-processing a notification.
    async fn fetch_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, WebhookGatewayError>;

    /// Notifications whose slot came and went more than `grace` ago without completing. These
    /// are stuck entries (a crashed run, or a row that was never picked up) and are candidates
    /// for the scheduler's rescue sweep. The `processing` flag is deliberately ignored here.
    async fn fetch_skipped_notifications(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Vec<Notification>, WebhookGatewayError>;

    /// Sets or clears the advisory in-flight lock.
    async fn set_processing(&self, id: i64, processing: bool) -> Result<(), WebhookGatewayError>;

    /// Marks the notification as terminally processed. Also clears the `processing` flag, so a
    /// done row can never be left claimed.
    async fn mark_done(&self, id: i64) -> Result<(), WebhookGatewayError>;

    async fn set_schedule(
        &self,
        id: i64,
        time: DateTime<Utc>,
    ) -> Result<(), WebhookGatewayError>;

    /// Records a processing failure on the notification: stores `message` and increments the
    /// error count. Returns the updated error count.
    async fn record_error(&self, id: i64, message: &str) -> Result<i64, WebhookGatewayError>;
}
