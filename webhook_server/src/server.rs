use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use webhook_engine::{
    events::{EventHandlers, EventHooks},
    NotificationApi, SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions, PSP_HMAC_HEADER},
    errors::ServerError,
    middleware::{BasicAuthMiddlewareFactory, HmacMiddlewareFactory},
    routes::{health, IncomingWebhookRoute, NotificationByIdRoute, NotificationsRoute, RescheduleNotificationRoute},
    workers::{start_dispatch_worker, start_scheduler_worker},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(16, default_event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    start_scheduler_worker(db.clone());
    start_dispatch_worker(db.clone(), producers);
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let notifications_api = NotificationApi::new(db.clone());
        let options = ServerOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pwg::access_log"))
            .app_data(web::Data::new(notifications_api))
            .app_data(web::Data::new(options));
        // The provider's deliveries: credentials plus signature over the raw body
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                PSP_HMAC_HEADER,
                config.hmac_secret.clone(),
                config.hmac_checks,
            ))
            .wrap(BasicAuthMiddlewareFactory::new(
                &config.webhook_username,
                config.webhook_password.clone(),
            ))
            .service(IncomingWebhookRoute::<SqliteDatabase>::new());
        let admin_scope = web::scope("/api")
            .wrap(BasicAuthMiddlewareFactory::new(
                &config.admin_username,
                config.admin_password.clone(),
            ))
            .service(NotificationsRoute::<SqliteDatabase>::new())
            .service(NotificationByIdRoute::<SqliteDatabase>::new())
            .service(RescheduleNotificationRoute::<SqliteDatabase>::new());
        app.service(health).service(webhook_scope).service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// The default subscriber set: log every applied transition.
fn default_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_state_changed(|event| {
        Box::pin(async move {
            info!(
                "💱️ Transaction {} (order {}) moved from '{}' to '{}' on [{}]",
                event.transaction_id, event.order_number, event.from, event.to, event.psp_reference
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}
