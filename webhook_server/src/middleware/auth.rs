//! Basic-auth middleware.
//!
//! The payment provider is configured with a username and password per merchant account and
//! sends them with every webhook delivery; the administrative endpoints use a second pair.
//! This middleware can be placed on any route or scope and checks the `Authorization` header
//! against the configured credentials before letting the request through.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use pwg_common::Secret;

use crate::{
    errors::{AuthError, ServerError},
    helpers::validate_basic_auth,
};

pub struct BasicAuthMiddlewareFactory {
    username: String,
    password: Secret<String>,
}

impl BasicAuthMiddlewareFactory {
    pub fn new(username: &str, password: Secret<String>) -> Self {
        BasicAuthMiddlewareFactory { username: username.into(), password }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BasicAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = BasicAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BasicAuthMiddlewareService {
            username: self.username.clone(),
            password: self.password.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct BasicAuthMiddlewareService<S> {
    username: String,
    password: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for BasicAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let username = self.username.clone();
        let password = self.password.clone();
        Box::pin(async move {
            trace!("🔐️ Checking basic-auth credentials for request");
            let header = req.headers().get(AUTHORIZATION);
            if header.is_none() {
                warn!("🔐️ No credentials found in request. Denying access.");
                return Err(ServerError::AuthenticationError(AuthError::MissingCredentials).into());
            }
            if validate_basic_auth(header, &username, &password) {
                trace!("🔐️ Basic-auth check for request ✅️");
                service.call(req).await
            } else {
                warn!("🔐️ Invalid credentials found in request. Denying access.");
                Err(ServerError::AuthenticationError(AuthError::InvalidCredentials).into())
            }
        })
    }
}
