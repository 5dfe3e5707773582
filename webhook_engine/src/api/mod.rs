pub mod dispatch_api;
pub mod notification_api;
pub mod scheduler_api;
