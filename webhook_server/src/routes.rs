//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module
//! neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the
//! current thread will stop that worker from processing new requests. Any long, non-cpu-bound
//! operation (I/O, database access, etc.) must therefore be expressed as a future or an
//! asynchronous function; async handlers get executed concurrently by worker threads and thus
//! don't block execution.

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use webhook_engine::{db_types::Pagination, traits::NotificationManagement, NotificationApi};

use crate::{
    config::ServerOptions,
    data_objects::{JsonResponse, NotificationRequest, WEBHOOK_ACK},
    errors::ServerError,
    helpers::get_remote_ip,
};

// Actix cannot handle generics in handlers, so routes are registered manually via the `route!`
// macro, which generates a unit struct implementing `HttpServiceFactory` for each handler.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook receiver  -------------------------------------------
route!(incoming_webhook => Post "/notifications" impl NotificationManagement);
/// The inbound webhook endpoint.
///
/// Authentication (signature and credentials) happens in the middleware wrapping this scope.
/// By the time a request lands here it is trusted, so the only job left is to persist every
/// item in the envelope and acknowledge. The provider treats anything other than the fixed
/// acknowledgement body as a failed delivery and will retry, so processing outcomes are never
/// reported here; they are visible via logs and the admin surface.
pub async fn incoming_webhook<B>(
    req: HttpRequest,
    body: web::Json<NotificationRequest>,
    api: web::Data<NotificationApi<B>>,
    options: web::Data<ServerOptions>,
) -> HttpResponse
where
    B: NotificationManagement,
{
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown peer".to_string());
    let envelope = body.into_inner();
    debug!("📩️ Webhook delivery from {peer} with {} item(s)", envelope.notification_items.len());
    let live = envelope.live;
    for item in envelope.notification_items {
        let notification = item.notification_request_item.into_new_notification(live);
        let reference = notification.psp_reference.clone();
        if let Err(e) = api.store_notification(notification).await {
            error!("📩️ Could not persist notification [{reference}]: {e}");
            return HttpResponse::InternalServerError()
                .json(JsonResponse::failure("Could not persist notification."));
        }
    }
    HttpResponse::Ok().body(WEBHOOK_ACK)
}

//----------------------------------------------   Admin surface  ----------------------------------------------
route!(notifications => Get "/notifications" impl NotificationManagement);
/// Paginated notification listing, newest first.
pub async fn notifications<B: NotificationManagement>(
    query: web::Query<Pagination>,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let pagination = query.into_inner();
    debug!("💻️ GET notifications [offset {}, limit {}]", pagination.offset, pagination.limit);
    let result = api.fetch_notifications(pagination).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(notification_by_id => Get "/notification/{id}" impl NotificationManagement);
pub async fn notification_by_id<B: NotificationManagement>(
    path: web::Path<i64>,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET notification {id}");
    let notification = api.fetch_notification(id).await?;
    Ok(HttpResponse::Ok().json(notification))
}

route!(reschedule_notification => Post "/notification/{id}/reschedule" impl NotificationManagement);
/// The administrative escape hatch for stuck or abandoned notifications: clears the in-flight
/// lock and makes the row due immediately, so the next dispatcher pass reprocesses it.
pub async fn reschedule_notification<B: NotificationManagement>(
    path: web::Path<i64>,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    info!("💻️ POST reschedule notification {id}");
    let notification = api.reschedule_now(id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(notification))
}
