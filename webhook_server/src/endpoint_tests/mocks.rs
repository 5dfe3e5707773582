use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use webhook_engine::{
    db_types::{NewNotification, Notification, Pagination},
    traits::{NotificationManagement, WebhookGatewayError},
};

use crate::config::ServerOptions;

mock! {
    pub NotificationBackend {}
    impl NotificationManagement for NotificationBackend {
        async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, WebhookGatewayError>;
        async fn fetch_notification(&self, id: i64) -> Result<Option<Notification>, WebhookGatewayError>;
        async fn fetch_notifications(&self, pagination: Pagination) -> Result<Vec<Notification>, WebhookGatewayError>;
        async fn fetch_unscheduled_notifications(&self) -> Result<Vec<Notification>, WebhookGatewayError>;
        async fn fetch_due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, WebhookGatewayError>;
        async fn fetch_skipped_notifications(&self, now: DateTime<Utc>, grace: Duration) -> Result<Vec<Notification>, WebhookGatewayError>;
        async fn set_processing(&self, id: i64, processing: bool) -> Result<(), WebhookGatewayError>;
        async fn mark_done(&self, id: i64) -> Result<(), WebhookGatewayError>;
        async fn set_schedule(&self, id: i64, time: DateTime<Utc>) -> Result<(), WebhookGatewayError>;
        async fn record_error(&self, id: i64, message: &str) -> Result<i64, WebhookGatewayError>;
    }
}

/// The Notification row the store would hand back for a fresh insert.
pub fn stored(notification: &NewNotification, id: i64) -> Notification {
    Notification {
        id,
        psp_reference: notification.psp_reference.clone(),
        original_reference: notification.original_reference.clone(),
        merchant_reference: notification.merchant_reference.clone(),
        event_code: notification.event_code.clone(),
        success: notification.success,
        payment_method: notification.payment_method.clone(),
        amount: notification.amount,
        currency: notification.currency.clone(),
        reason: notification.reason.clone(),
        live: notification.live,
        additional_data: notification.additional_data.clone(),
        done: false,
        processing: false,
        scheduled_processing_time: None,
        error_count: 0,
        error_message: None,
        created_at: notification.received_at,
        updated_at: notification.received_at,
    }
}

pub fn test_options() -> ServerOptions {
    ServerOptions {
        use_x_forwarded_for: false,
        use_forwarded: false,
        merchant_account: "TestMerchant".to_string(),
    }
}
