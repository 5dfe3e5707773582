//! # Payment Webhook Gateway server
//!
//! This crate hosts the HTTP surface and the operational glue around the webhook engine. It is
//! responsible for:
//! * Listening for incoming webhook deliveries from the payment provider, authenticating them
//!   (HMAC signature and basic-auth credentials) and persisting them.
//! * The administrative endpoints for listing and manually rescheduling notifications.
//! * The two periodic background jobs: the scheduler sweep and the dispatcher pass.
//!
//! ## Configuration
//! The server is configured via `PWG_*` environment variables. See [config](config/index.html)
//! for more information.
//!
//! ## Routes
//! * `/health`: a health check route that returns a 200 OK response.
//! * `/webhook/notifications`: the webhook delivery endpoint.
//! * `/api/notifications`, `/api/notification/{id}`, `/api/notification/{id}/reschedule`: the
//!   administrative surface.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
