use log::trace;
use pwg_common::MinorUnits;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, OrderTransaction, PaymentState},
    traits::WebhookGatewayError,
};

/// Inserts a platform order record. In production these rows are written by the storefront's
/// order flow; the engine only ever reads them back by order number.
pub async fn insert_order(
    order_number: &str,
    total_amount: f64,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, WebhookGatewayError> {
    let order = sqlx::query_as(
        "INSERT INTO orders (order_number, total_amount, currency) VALUES ($1, $2, $3) RETURNING *;",
    )
    .bind(order_number)
    .bind(total_amount)
    .bind(currency)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn insert_transaction(
    order_id: i64,
    psp_reference: Option<&str>,
    payment_method: Option<&str>,
    state: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderTransaction, WebhookGatewayError> {
    let transaction = sqlx::query_as(
        "INSERT INTO order_transactions (order_id, psp_reference, payment_method, state) VALUES \
         ($1, $2, $3, $4) RETURNING *;",
    )
    .bind(order_id)
    .bind(psp_reference)
    .bind(payment_method)
    .bind(state)
    .fetch_one(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch_order_by_number(
    order_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_transaction_by_id(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_transactions WHERE id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await
}

/// The first transaction of the order in a webhook-relevant state, oldest first.
pub async fn fetch_webhook_transaction(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderTransaction>, sqlx::Error> {
    let states = PaymentState::WEBHOOK_RELEVANT
        .iter()
        .map(|s| format!("'{}'", s.technical_name()))
        .collect::<Vec<_>>()
        .join(",");
    let query = format!(
        "SELECT * FROM order_transactions WHERE order_id = $1 AND state IN ({states}) ORDER BY \
         created_at ASC, id ASC LIMIT 1"
    );
    sqlx::query_as(query.as_str()).bind(order_id).fetch_optional(conn).await
}

pub(crate) async fn update_transaction_state(
    transaction_id: i64,
    state: &str,
    conn: &mut SqliteConnection,
) -> Result<OrderTransaction, WebhookGatewayError> {
    let result: Option<OrderTransaction> = sqlx::query_as(
        "UPDATE order_transactions SET state = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
         RETURNING *",
    )
    .bind(state)
    .bind(transaction_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| WebhookGatewayError::TransactionNotFound(transaction_id.to_string()))
}

/// Records a refund, ignoring re-deliveries of one that is already on file. Returns `true` if a
/// row was inserted.
pub(crate) async fn insert_refund(
    transaction_id: i64,
    psp_reference: &str,
    amount: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<bool, WebhookGatewayError> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO refunds (transaction_id, psp_reference, amount_value) VALUES \
         ($1, $2, $3)",
    )
    .bind(transaction_id)
    .bind(psp_reference)
    .bind(amount.value())
    .execute(conn)
    .await?;
    let inserted = result.rows_affected() > 0;
    trace!("🗃️ Refund {psp_reference} for transaction {transaction_id}: inserted={inserted}");
    Ok(inserted)
}

pub async fn refunded_total(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<MinorUnits, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_value), 0) FROM refunds WHERE transaction_id = $1",
    )
    .bind(transaction_id)
    .fetch_one(conn)
    .await?;
    Ok(MinorUnits::from(total))
}

/// Records a capture, ignoring re-deliveries. Returns `true` if a row was inserted.
pub(crate) async fn insert_capture(
    transaction_id: i64,
    psp_reference: &str,
    amount: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<bool, WebhookGatewayError> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO captures (transaction_id, psp_reference, amount_value) VALUES \
         ($1, $2, $3)",
    )
    .bind(transaction_id)
    .bind(psp_reference)
    .bind(amount.value())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn captured_total(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<MinorUnits, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_value), 0) FROM captures WHERE transaction_id = $1",
    )
    .bind(transaction_id)
    .fetch_one(conn)
    .await?;
    Ok(MinorUnits::from(total))
}
