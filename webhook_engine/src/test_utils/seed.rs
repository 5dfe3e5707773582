//! Seeds platform-side order data. In production these rows are written by the storefront's
//! order flow, which is outside this crate; tests create them directly.

use crate::{
    db_types::{Order, OrderTransaction},
    sqlite::db::orders,
    traits::WebhookGatewayError,
    SqliteDatabase,
};

pub async fn order_with_transaction(
    db: &SqliteDatabase,
    order_number: &str,
    total_amount: f64,
    currency: &str,
    state: &str,
) -> Result<(Order, OrderTransaction), WebhookGatewayError> {
    let mut conn = db.pool().acquire().await?;
    let order = orders::insert_order(order_number, total_amount, currency, &mut conn).await?;
    let psp_reference = format!("AUTH-{order_number}");
    let transaction = orders::insert_transaction(
        order.id,
        Some(psp_reference.as_str()),
        Some("card"),
        state,
        &mut conn,
    )
    .await?;
    Ok((order, transaction))
}

pub async fn fetch_transaction(
    db: &SqliteDatabase,
    transaction_id: i64,
) -> Result<Option<OrderTransaction>, WebhookGatewayError> {
    let mut conn = db.pool().acquire().await?;
    let transaction = orders::fetch_transaction_by_id(transaction_id, &mut conn).await?;
    Ok(transaction)
}
