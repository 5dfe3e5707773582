mod auth;
mod hmac;

pub use auth::{BasicAuthMiddlewareFactory, BasicAuthMiddlewareService};
pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService};
