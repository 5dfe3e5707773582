use actix_web::{
    dev::Service,
    http::{header::AUTHORIZATION, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use log::*;
use pwg_common::Secret;
use serde_json::json;
use webhook_engine::{db_types::NewNotification, NotificationApi};

use super::mocks::{stored, test_options, MockNotificationBackend};
use crate::{
    config::PSP_HMAC_HEADER,
    helpers::{basic_auth_header, calculate_hmac},
    middleware::{BasicAuthMiddlewareFactory, HmacMiddlewareFactory},
    routes::IncomingWebhookRoute,
};

const HMAC_KEY: &str = "0123456789abcdef";
const USERNAME: &str = "psp-webhooks";
const PASSWORD: &str = "delivery-password";

fn payload() -> String {
    json!({
        "live": "false",
        "notificationItems": [
            {
                "NotificationRequestItem": {
                    "pspReference": "7914073381342284",
                    "merchantReference": "ORDER-1001",
                    "eventCode": "AUTHORISATION",
                    "success": "true",
                    "amount": { "value": 2500, "currency": "EUR" }
                }
            }
        ]
    })
    .to_string()
}

/// Builds the app exactly the way the server wires the /webhook scope.
async fn secured_app(
    backend: MockNotificationBackend,
    hmac_checks: bool,
) -> impl Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
> {
    let scope = web::scope("/webhook")
        .wrap(HmacMiddlewareFactory::new(
            PSP_HMAC_HEADER,
            Secret::new(HMAC_KEY.to_string()),
            hmac_checks,
        ))
        .wrap(BasicAuthMiddlewareFactory::new(USERNAME, Secret::new(PASSWORD.to_string())))
        .service(IncomingWebhookRoute::<MockNotificationBackend>::new());
    let app = App::new()
        .app_data(web::Data::new(NotificationApi::new(backend)))
        .app_data(web::Data::new(test_options()))
        .service(scope);
    test::init_service(app).await
}

fn accepting_backend(expected_inserts: usize) -> MockNotificationBackend {
    let mut backend = MockNotificationBackend::new();
    backend
        .expect_insert_notification()
        .times(expected_inserts)
        .returning(|n: NewNotification| Ok(stored(&n, 1)));
    backend
}

/// Middleware failures surface as service errors; resolve either branch to a status code.
async fn status_of(
    app: &impl Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
    req: actix_http::Request,
) -> StatusCode {
    match app.call(req).await {
        Ok(res) => res.status(),
        Err(e) => e.as_response_error().status_code(),
    }
}

#[actix_web::test]
async fn deliveries_without_credentials_are_rejected() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(0), true).await;
    let body = payload();
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((PSP_HMAC_HEADER, calculate_hmac(HMAC_KEY, body.as_bytes())))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let status = status_of(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn deliveries_with_wrong_credentials_are_rejected() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(0), true).await;
    let body = payload();
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((AUTHORIZATION, basic_auth_header(USERNAME, "guessed")))
        .insert_header((PSP_HMAC_HEADER, calculate_hmac(HMAC_KEY, body.as_bytes())))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let status = status_of(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unsigned_deliveries_are_rejected() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(0), true).await;
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((AUTHORIZATION, basic_auth_header(USERNAME, PASSWORD)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(payload())
        .to_request();
    let status = status_of(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn tampered_deliveries_are_rejected() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(0), true).await;
    let body = payload();
    let signature_of_other_body = calculate_hmac(HMAC_KEY, b"something else entirely");
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((AUTHORIZATION, basic_auth_header(USERNAME, PASSWORD)))
        .insert_header((PSP_HMAC_HEADER, signature_of_other_body))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let status = status_of(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn correctly_signed_deliveries_pass_both_checks() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(1), true).await;
    let body = payload();
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((AUTHORIZATION, basic_auth_header(USERNAME, PASSWORD)))
        .insert_header((PSP_HMAC_HEADER, calculate_hmac(HMAC_KEY, body.as_bytes())))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let status = status_of(&app, req).await;
    info!("Response status: {status}");
    assert!(status.is_success());
}

#[actix_web::test]
async fn disabled_hmac_checks_let_unsigned_deliveries_through() {
    let _ = env_logger::try_init().ok();
    let app = secured_app(accepting_backend(1), false).await;
    let req = TestRequest::post()
        .uri("/webhook/notifications")
        .insert_header((AUTHORIZATION, basic_auth_header(USERNAME, PASSWORD)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(payload())
        .to_request();
    let status = status_of(&app, req).await;
    assert!(status.is_success());
}
