use chrono::{DateTime, Duration, Utc};
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{EventCode, NewNotification, Notification, Pagination},
    traits::WebhookGatewayError,
};

impl FromRow<'_, SqliteRow> for Notification {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let event_code: String = row.try_get("event_code")?;
        let additional_data: Option<String> = row.try_get("additional_data")?;
        let additional_data = additional_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "additional_data".to_string(),
                source: Box::new(e),
            })?
            .unwrap_or_default();
        Ok(Self {
            id: row.try_get("id")?,
            psp_reference: row.try_get("psp_reference")?,
            original_reference: row.try_get("original_reference")?,
            merchant_reference: row.try_get("merchant_reference")?,
            event_code: EventCode::from(event_code),
            success: row.try_get("success")?,
            payment_method: row.try_get("payment_method")?,
            amount: row.try_get("amount_value")?,
            currency: row.try_get("amount_currency")?,
            reason: row.try_get("reason")?,
            live: row.try_get("live")?,
            additional_data,
            done: row.try_get("done")?,
            processing: row.try_get("processing")?,
            scheduled_processing_time: row.try_get("scheduled_processing_time")?,
            error_count: row.try_get("error_count")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Inserts a notification row. Every delivery gets its own row, including re-deliveries of an
/// event that was already received; processing is where duplicates get reconciled.
pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, WebhookGatewayError> {
    let additional_data = if notification.additional_data.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&notification.additional_data)
                .map_err(|e| WebhookGatewayError::DatabaseError(e.to_string()))?,
        )
    };
    let notification = sqlx::query_as(
        r#"
            INSERT INTO notifications (
                psp_reference,
                original_reference,
                merchant_reference,
                event_code,
                success,
                payment_method,
                amount_value,
                amount_currency,
                reason,
                live,
                additional_data,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(notification.psp_reference)
    .bind(notification.original_reference)
    .bind(notification.merchant_reference)
    .bind(notification.event_code.to_string())
    .bind(notification.success)
    .bind(notification.payment_method)
    .bind(notification.amount.value())
    .bind(notification.currency)
    .bind(notification.reason)
    .bind(notification.live)
    .bind(additional_data)
    .bind(notification.received_at)
    .fetch_one(conn)
    .await?;
    Ok(notification)
}

pub async fn fetch_notification_by_id(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM notifications WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Notifications for the admin listing, newest first.
pub async fn fetch_notifications(
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM notifications ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(pagination.limit)
    .bind(pagination.offset)
    .fetch_all(conn)
    .await
}

/// Notifications without a processing slot yet, oldest first.
pub async fn fetch_unscheduled(conn: &mut SqliteConnection) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM notifications WHERE done = 0 AND scheduled_processing_time IS NULL ORDER \
         BY created_at ASC",
    )
    .fetch_all(conn)
    .await
}

/// The dispatcher's work list: due, unfinished and unclaimed. Rows with `processing = 1` are
/// excluded so a concurrent dispatcher run cannot pick them up.
pub async fn fetch_due(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let due = sqlx::query_as(
        "SELECT * FROM notifications WHERE done = 0 AND processing = 0 AND \
         scheduled_processing_time IS NOT NULL AND scheduled_processing_time <= $1 ORDER BY \
         scheduled_processing_time ASC, id ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} due notifications fetched", due.len());
    Ok(due)
}

/// Unfinished notifications whose slot is further in the past than the grace window, whatever
/// their `processing` flag says. These are the stuck entries the rescue sweep recovers.
pub async fn fetch_skipped(
    now: DateTime<Utc>,
    grace: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let cutoff = now - grace;
    sqlx::query_as(
        "SELECT * FROM notifications WHERE done = 0 AND scheduled_processing_time IS NOT NULL \
         AND scheduled_processing_time < $1 ORDER BY scheduled_processing_time ASC",
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await
}

pub(crate) async fn set_processing(
    id: i64,
    processing: bool,
    conn: &mut SqliteConnection,
) -> Result<(), WebhookGatewayError> {
    let result = sqlx::query(
        "UPDATE notifications SET processing = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(processing)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WebhookGatewayError::NotificationNotFound(id));
    }
    Ok(())
}

/// Terminal: also releases the advisory lock so no row is ever left done *and* claimed.
pub(crate) async fn mark_done(id: i64, conn: &mut SqliteConnection) -> Result<(), WebhookGatewayError> {
    let result = sqlx::query(
        "UPDATE notifications SET done = 1, processing = 0, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1",
    )
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WebhookGatewayError::NotificationNotFound(id));
    }
    Ok(())
}

pub(crate) async fn set_schedule(
    id: i64,
    time: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), WebhookGatewayError> {
    let result = sqlx::query(
        "UPDATE notifications SET scheduled_processing_time = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2",
    )
    .bind(time)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WebhookGatewayError::NotificationNotFound(id));
    }
    Ok(())
}

/// Stores the failure text and bumps the error count, returning the new count.
pub(crate) async fn record_error(
    id: i64,
    message: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, WebhookGatewayError> {
    let count: Option<i64> = sqlx::query_scalar(
        "UPDATE notifications SET error_count = error_count + 1, error_message = $1, updated_at \
         = CURRENT_TIMESTAMP WHERE id = $2 RETURNING error_count",
    )
    .bind(message)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    count.ok_or(WebhookGatewayError::NotificationNotFound(id))
}
