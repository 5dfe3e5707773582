//! `SqliteDatabase` is a concrete implementation of a webhook engine backend.
//!
//! Unsurprisingly, it uses SQLite, and implements the repository traits defined in the
//! [`crate::traits`] module on top of the low-level functions in [`super::db`].
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::trace;
use pwg_common::MinorUnits;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, notifications, orders};
use crate::{
    db_types::{NewNotification, Notification, Order, OrderTransaction, Pagination, PaymentState},
    traits::{NotificationManagement, TransactionManagement, WebhookGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::insert_notification(notification, &mut conn).await
    }

    async fn fetch_notification(&self, id: i64) -> Result<Option<Notification>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let notification = notifications::fetch_notification_by_id(id, &mut conn).await?;
        Ok(notification)
    }

    async fn fetch_notifications(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<Notification>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::fetch_notifications(pagination, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_unscheduled_notifications(&self) -> Result<Vec<Notification>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::fetch_unscheduled(&mut conn).await?;
        Ok(result)
    }

    async fn fetch_due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::fetch_due(now, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_skipped_notifications(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Vec<Notification>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::fetch_skipped(now, grace, &mut conn).await?;
        Ok(result)
    }

    async fn set_processing(&self, id: i64, processing: bool) -> Result<(), WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::set_processing(id, processing, &mut conn).await
    }

    async fn mark_done(&self, id: i64) -> Result<(), WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_done(id, &mut conn).await
    }

    async fn set_schedule(&self, id: i64, time: DateTime<Utc>) -> Result<(), WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::set_schedule(id, time, &mut conn).await
    }

    async fn record_error(&self, id: i64, message: &str) -> Result<i64, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::record_error(id, message, &mut conn).await
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn fetch_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_webhook_transaction(
        &self,
        order_id: i64,
    ) -> Result<Option<OrderTransaction>, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = orders::fetch_webhook_transaction(order_id, &mut conn).await?;
        Ok(transaction)
    }

    /// Validates the transition against the platform's transition table inside a single
    /// transaction, so a concurrent state change cannot slip between the check and the update.
    async fn transition_state(
        &self,
        transaction_id: i64,
        target: PaymentState,
    ) -> Result<OrderTransaction, WebhookGatewayError> {
        let mut tx = self.pool.begin().await?;
        let current = orders::fetch_transaction_by_id(transaction_id, &mut tx)
            .await?
            .ok_or_else(|| WebhookGatewayError::TransactionNotFound(transaction_id.to_string()))?;
        let from = PaymentState::from_technical_name(&current.state)
            .ok_or_else(|| WebhookGatewayError::UnmappedState(transaction_id, current.state.clone()))?;
        if !from.can_transition_to(target) {
            return Err(WebhookGatewayError::IllegalStateTransition { from, to: target });
        }
        let updated =
            orders::update_transaction_state(transaction_id, target.technical_name(), &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Transaction {transaction_id} moved from '{from}' to '{target}'");
        Ok(updated)
    }

    async fn record_refund(
        &self,
        transaction_id: i64,
        psp_reference: &str,
        amount: MinorUnits,
    ) -> Result<bool, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_refund(transaction_id, psp_reference, amount, &mut conn).await
    }

    async fn refunded_total(&self, transaction_id: i64) -> Result<MinorUnits, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let total = orders::refunded_total(transaction_id, &mut conn).await?;
        Ok(total)
    }

    async fn record_capture(
        &self,
        transaction_id: i64,
        psp_reference: &str,
        amount: MinorUnits,
    ) -> Result<bool, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_capture(transaction_id, psp_reference, amount, &mut conn).await
    }

    async fn captured_total(&self, transaction_id: i64) -> Result<MinorUnits, WebhookGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let total = orders::captured_total(transaction_id, &mut conn).await?;
        Ok(total)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// The URL this database was created with.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
