//! End-to-end dispatcher behaviour against a real SQLite store.

use chrono::{DateTime, Duration, Utc};
use pwg_common::MinorUnits;
use webhook_engine::{
    db_types::{EventCode, NewNotification, Notification},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed,
    },
    traits::{NotificationManagement, TransactionManagement},
    DispatchApi, NotificationApi, SqliteDatabase,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn dispatcher(db: &SqliteDatabase) -> DispatchApi<SqliteDatabase> {
    DispatchApi::new(db.clone(), EventProducers::default())
}

/// Stores a notification and makes it due at `now`.
async fn deliver(db: &SqliteDatabase, notification: NewNotification, now: DateTime<Utc>) -> Notification {
    let api = NotificationApi::new(db.clone());
    let saved = api.store_notification(notification).await.expect("Error storing notification");
    db.set_schedule(saved.id, now).await.expect("Error scheduling notification");
    saved
}

async fn notification_by_id(db: &SqliteDatabase, id: i64) -> Notification {
    db.fetch_notification(id).await.expect("Error fetching notification").expect("Notification is gone")
}

#[tokio::test]
async fn successful_authorisation_pays_an_in_progress_transaction() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1001", 99.95, "EUR", "in_progress").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-AUTH-1",
        "1001",
        EventCode::Authorisation,
        true,
        MinorUnits::from(9995),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.total(), 1);
    let updated = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap();
    assert_eq!(updated.state, "paid");
    let settled = notification_by_id(&db, saved.id).await;
    assert!(settled.done);
    assert!(!settled.processing);
    assert_eq!(settled.error_count, 0);
}

#[tokio::test]
async fn refused_authorisation_fails_an_in_progress_transaction() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1002", 50.00, "EUR", "in_progress").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-AUTH-2",
        "1002",
        EventCode::Authorisation,
        false,
        MinorUnits::from(5000),
        "EUR",
    )
    .with_reason("CVC Declined");
    deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.completed, 1);
    let updated = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap();
    assert_eq!(updated.state, "failed");
}

#[tokio::test]
async fn unknown_order_short_circuits_after_one_pass() {
    let db = new_db().await;
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-GHOST",
        "does-not-exist",
        EventCode::Authorisation,
        true,
        MinorUnits::from(100),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.failed_terminally, 1);
    let settled = notification_by_id(&db, saved.id).await;
    assert!(settled.done);
    assert!(settled.error_message.unwrap().contains("does-not-exist"));
    // No reschedule happened: a later pass finds nothing to do
    let summary = dispatcher(&db).process_due(now + Duration::days(2)).await.unwrap();
    assert!(summary.is_empty());
}

#[tokio::test]
async fn transaction_outside_the_relevant_states_is_terminal() {
    let db = new_db().await;
    seed::order_with_transaction(&db, "1003", 25.00, "EUR", "failed").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-AUTH-3",
        "1003",
        EventCode::Authorisation,
        true,
        MinorUnits::from(2500),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.failed_terminally, 1);
    assert!(notification_by_id(&db, saved.id).await.done);
}

#[tokio::test]
async fn unhandled_event_codes_are_ignored_without_errors() {
    let db = new_db().await;
    seed::order_with_transaction(&db, "1004", 10.00, "EUR", "paid").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-REPORT",
        "1004",
        EventCode::ReportAvailable,
        true,
        MinorUnits::from(0),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.ignored, 1);
    let settled = notification_by_id(&db, saved.id).await;
    assert!(settled.done);
    assert_eq!(settled.error_count, 0);
}

#[tokio::test]
async fn capture_before_authorisation_is_retried_then_abandoned() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1005", 75.00, "EUR", "open").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-CAPTURE-1",
        "1005",
        EventCode::Capture,
        true,
        MinorUnits::from(7500),
        "EUR",
    )
    .with_original_reference("AUTH-1005");
    let saved = deliver(&db, delivery, now).await;
    let api = dispatcher(&db);

    let summary = api.process_due(now).await.unwrap();
    assert_eq!(summary.rescheduled, 1);
    let after_first = notification_by_id(&db, saved.id).await;
    assert_eq!(after_first.error_count, 1);
    assert!(!after_first.done);
    assert!(!after_first.processing);
    assert!(after_first.scheduled_processing_time.unwrap() > now);

    let summary = api.process_due(now + Duration::hours(1)).await.unwrap();
    assert_eq!(summary.rescheduled, 1);
    assert_eq!(notification_by_id(&db, saved.id).await.error_count, 2);

    // Third failure exhausts the attempt budget
    let summary = api.process_due(now + Duration::hours(2)).await.unwrap();
    assert_eq!(summary.abandoned, 1);
    let settled = notification_by_id(&db, saved.id).await;
    assert_eq!(settled.error_count, 3);
    assert!(settled.done);

    // No fourth attempt, and the transaction never moved
    let summary = api.process_due(now + Duration::days(2)).await.unwrap();
    assert!(summary.is_empty());
    let untouched = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap();
    assert_eq!(untouched.state, "open");
}

#[tokio::test]
async fn capture_after_authorisation_is_reconciled() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1006", 60.00, "EUR", "paid").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-CAPTURE-2",
        "1006",
        EventCode::Capture,
        true,
        MinorUnits::from(6000),
        "EUR",
    )
    .with_original_reference("AUTH-1006");
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert!(notification_by_id(&db, saved.id).await.done);
    // Capture does not change the state; it only reconciles bookkeeping
    let updated = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap();
    assert_eq!(updated.state, "paid");
}

#[tokio::test]
async fn a_processing_notification_is_invisible_to_concurrent_runs() {
    let db = new_db().await;
    seed::order_with_transaction(&db, "1007", 12.00, "EUR", "in_progress").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-AUTH-7",
        "1007",
        EventCode::Authorisation,
        true,
        MinorUnits::from(1200),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;
    // Simulate a concurrent run that has already claimed the row
    db.set_processing(saved.id, true).await.unwrap();

    let due = db.fetch_due_notifications(now).await.unwrap();
    assert!(due.is_empty());
    let summary = dispatcher(&db).process_due(now).await.unwrap();
    assert!(summary.is_empty());
}

#[tokio::test]
async fn partial_refunds_accumulate_into_a_full_refund() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1008", 333.33, "EUR", "paid").await.unwrap();
    let api = dispatcher(&db);
    let now = Utc::now();

    let refund = |psp: &str, amount: i64| {
        NewNotification::new(psp, "1008", EventCode::Refund, true, MinorUnits::from(amount), "EUR")
            .with_original_reference("AUTH-1008")
    };

    deliver(&db, refund("PSP-REFUND-1", 22233), now).await;
    api.process_due(now).await.unwrap();
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "partially_refunded");

    // 22233 + 5200 = 27433 < 33333: still a partial refund
    deliver(&db, refund("PSP-REFUND-2", 5200), now).await;
    api.process_due(now).await.unwrap();
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "partially_refunded");

    // 27433 + 5900 = 33333: the order is now fully refunded
    deliver(&db, refund("PSP-REFUND-3", 5900), now).await;
    let summary = api.process_due(now).await.unwrap();
    assert_eq!(summary.completed, 1);
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "refunded");
}

#[tokio::test]
async fn redelivered_refunds_are_not_counted_twice() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1009", 333.33, "EUR", "paid").await.unwrap();
    let api = dispatcher(&db);
    let now = Utc::now();

    let refund = NewNotification::new(
        "PSP-REFUND-DUP",
        "1009",
        EventCode::Refund,
        true,
        MinorUnits::from(22233),
        "EUR",
    );
    let first = deliver(&db, refund.clone(), now).await;
    let second = deliver(&db, refund, now).await;

    let summary = api.process_due(now).await.unwrap();
    assert_eq!(summary.completed, 2);
    assert!(notification_by_id(&db, first.id).await.done);
    assert!(notification_by_id(&db, second.id).await.done);
    assert_eq!(db.refunded_total(transaction.id).await.unwrap(), MinorUnits::from(22233));
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "partially_refunded");
}

#[tokio::test]
async fn overshooting_refund_leaves_the_transaction_alone() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1010", 10.00, "EUR", "paid").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-REFUND-BIG",
        "1010",
        EventCode::Refund,
        true,
        MinorUnits::from(1500),
        "EUR",
    );
    let saved = deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.completed, 1);
    assert!(notification_by_id(&db, saved.id).await.done);
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "paid");
}

#[tokio::test]
async fn refund_of_an_authorized_transaction_forces_it_through_paid() {
    let db = new_db().await;
    let (_, transaction) =
        seed::order_with_transaction(&db, "1011", 42.00, "EUR", "authorized").await.unwrap();
    let now = Utc::now();
    let delivery = NewNotification::new(
        "PSP-REFUND-4",
        "1011",
        EventCode::Refund,
        true,
        MinorUnits::from(4200),
        "EUR",
    );
    deliver(&db, delivery, now).await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.completed, 1);
    let state = seed::fetch_transaction(&db, transaction.id).await.unwrap().unwrap().state;
    assert_eq!(state, "refunded");
}

#[tokio::test]
async fn one_bad_notification_does_not_abort_the_batch() {
    let db = new_db().await;
    seed::order_with_transaction(&db, "1012", 20.00, "EUR", "in_progress").await.unwrap();
    let now = Utc::now();
    deliver(
        &db,
        NewNotification::new("PSP-GHOST-2", "missing", EventCode::Authorisation, true, MinorUnits::from(1), "EUR"),
        now,
    )
    .await;
    let good = deliver(
        &db,
        NewNotification::new("PSP-AUTH-12", "1012", EventCode::Authorisation, true, MinorUnits::from(2000), "EUR"),
        now,
    )
    .await;

    let summary = dispatcher(&db).process_due(now).await.unwrap();

    assert_eq!(summary.failed_terminally, 1);
    assert_eq!(summary.completed, 1);
    assert!(notification_by_id(&db, good.id).await.done);
}
