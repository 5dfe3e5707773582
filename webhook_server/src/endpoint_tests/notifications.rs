use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::Utc;
use log::*;
use serde_json::{json, Value};
use webhook_engine::{db_types::NewNotification, traits::WebhookGatewayError, NotificationApi};

use super::mocks::{stored, test_options, MockNotificationBackend};
use crate::routes::{
    IncomingWebhookRoute,
    NotificationByIdRoute,
    NotificationsRoute,
    RescheduleNotificationRoute,
};

fn envelope(success: Value) -> Value {
    json!({
        "live": "false",
        "notificationItems": [
            {
                "NotificationRequestItem": {
                    "pspReference": "7914073381342284",
                    "merchantReference": "ORDER-1001",
                    "eventCode": "AUTHORISATION",
                    "success": success,
                    "paymentMethod": "visa",
                    "amount": { "value": 2500, "currency": "EUR" }
                }
            },
            {
                "NotificationRequestItem": {
                    "pspReference": "7914073381342285",
                    "originalReference": "7914073381342284",
                    "merchantReference": "ORDER-1001",
                    "eventCode": "CAPTURE",
                    "success": success,
                    "amount": { "value": 2500, "currency": "EUR" }
                }
            }
        ]
    })
}

async fn webhook_app(
    backend: MockNotificationBackend,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
> {
    let app = App::new()
        .app_data(web::Data::new(NotificationApi::new(backend)))
        .app_data(web::Data::new(test_options()))
        .service(IncomingWebhookRoute::<MockNotificationBackend>::new());
    test::init_service(app).await
}

#[actix_web::test]
async fn a_delivery_persists_every_item_and_acks() {
    let _ = env_logger::try_init().ok();
    let mut backend = MockNotificationBackend::new();
    backend
        .expect_insert_notification()
        .times(2)
        .returning(|n: NewNotification| Ok(stored(&n, 1)));
    let app = webhook_app(backend).await;
    let req = TestRequest::post().uri("/notifications").set_json(envelope(json!(true))).to_request();
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = res.into_body().try_into_bytes().unwrap();
    assert!(status.is_success());
    assert_eq!(body, "[accepted]");
}

#[actix_web::test]
async fn stringly_typed_success_flags_are_coerced() {
    let _ = env_logger::try_init().ok();
    let mut backend = MockNotificationBackend::new();
    backend
        .expect_insert_notification()
        .withf(|n: &NewNotification| n.success && !n.live)
        .times(2)
        .returning(|n: NewNotification| Ok(stored(&n, 1)));
    let app = webhook_app(backend).await;
    let req =
        TestRequest::post().uri("/notifications").set_json(envelope(json!("true"))).to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn a_store_failure_is_reported_as_a_server_error() {
    let _ = env_logger::try_init().ok();
    let mut backend = MockNotificationBackend::new();
    backend
        .expect_insert_notification()
        .returning(|_| Err(WebhookGatewayError::DatabaseError("disk full".to_string())));
    let app = webhook_app(backend).await;
    let req = TestRequest::post().uri("/notifications").set_json(envelope(json!(true))).to_request();
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    info!("Response body: {body}");
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Could not persist notification"));
}

#[actix_web::test]
async fn the_listing_forwards_pagination_parameters() {
    let _ = env_logger::try_init().ok();
    let mut backend = MockNotificationBackend::new();
    backend
        .expect_fetch_notifications()
        .withf(|p| p.limit == 2 && p.offset == 4)
        .times(1)
        .returning(|_| {
            let n = NewNotification::new(
                "PSP-1",
                "ORDER-1",
                "AUTHORISATION".parse().unwrap(),
                true,
                100.into(),
                "EUR",
            );
            Ok(vec![stored(&n, 7)])
        });
    let app = App::new()
        .app_data(web::Data::new(NotificationApi::new(backend)))
        .service(NotificationsRoute::<MockNotificationBackend>::new());
    let app = test::init_service(app).await;
    let req = TestRequest::get().uri("/notifications?limit=2&offset=4").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let listed: Value = test::read_body_json(res).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["psp_reference"], "PSP-1");
}

#[actix_web::test]
async fn a_missing_notification_is_a_404() {
    let _ = env_logger::try_init().ok();
    let mut backend = MockNotificationBackend::new();
    backend.expect_fetch_notification().returning(|_| Ok(None));
    let app = App::new()
        .app_data(web::Data::new(NotificationApi::new(backend)))
        .service(NotificationByIdRoute::<MockNotificationBackend>::new());
    let app = test::init_service(app).await;
    let req = TestRequest::get().uri("/notification/42").to_request();
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn rescheduling_resets_the_claim_and_slot() {
    let _ = env_logger::try_init().ok();
    let sample = NewNotification::new(
        "PSP-RESCHED",
        "ORDER-9",
        "CAPTURE".parse().unwrap(),
        true,
        500.into(),
        "EUR",
    );
    let stored_row = stored(&sample, 42);
    let mut backend = MockNotificationBackend::new();
    let row = stored_row.clone();
    backend.expect_fetch_notification().returning(move |_| Ok(Some(row.clone())));
    backend.expect_set_processing().withf(|id, processing| *id == 42 && !processing).times(1).returning(|_, _| Ok(()));
    let before = Utc::now();
    backend
        .expect_set_schedule()
        .withf(move |id, slot| *id == 42 && *slot >= before)
        .times(1)
        .returning(|_, _| Ok(()));
    let app = App::new()
        .app_data(web::Data::new(NotificationApi::new(backend)))
        .service(RescheduleNotificationRoute::<MockNotificationBackend>::new());
    let app = test::init_service(app).await;
    let req = TestRequest::post().uri("/notification/42/reschedule").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["psp_reference"], "PSP-RESCHED");
}
