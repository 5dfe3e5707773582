//! Receiver- and admin-facing notification operations.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{NewNotification, Notification, Pagination},
    traits::{NotificationManagement, WebhookGatewayError},
};

pub struct NotificationApi<B> {
    db: B,
}

impl<B> Debug for NotificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi")
    }
}

impl<B> NotificationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> NotificationApi<B>
where B: NotificationManagement
{
    /// Persists one inbound webhook item. Re-deliveries of an event that was already received
    /// get their own row; the processing loop is where duplicates are reconciled.
    pub async fn store_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, WebhookGatewayError> {
        let saved = self.db.insert_notification(notification).await?;
        debug!(
            "📥️ Notification [{}] {} for order {} stored with id {}",
            saved.psp_reference, saved.event_code, saved.merchant_reference, saved.id
        );
        Ok(saved)
    }

    pub async fn fetch_notification(&self, id: i64) -> Result<Notification, WebhookGatewayError> {
        self.db.fetch_notification(id).await?.ok_or(WebhookGatewayError::NotificationNotFound(id))
    }

    pub async fn fetch_notifications(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<Notification>, WebhookGatewayError> {
        self.db.fetch_notifications(pagination).await
    }

    /// The administrative escape hatch: clears the in-flight lock and schedules the
    /// notification for `now`, so the next dispatcher pass picks it up immediately.
    pub async fn reschedule_now(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Notification, WebhookGatewayError> {
        // Look it up first so a bad id fails with NotificationNotFound rather than a silent no-op.
        let notification =
            self.db.fetch_notification(id).await?.ok_or(WebhookGatewayError::NotificationNotFound(id))?;
        self.db.set_processing(id, false).await?;
        self.db.set_schedule(id, now).await?;
        info!(
            "📥️ Notification {id} [{}] was manually rescheduled for immediate processing",
            notification.psp_reference
        );
        self.fetch_notification(id).await
    }
}
