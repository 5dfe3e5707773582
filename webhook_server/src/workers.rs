//! The two periodic background jobs: the scheduler sweep and the dispatcher pass.
//!
//! Both run on their own fixed interval and only meet through the notification store, so
//! either can be restarted, or run as a one-off from the CLI, without affecting the other.
//! Overlapping dispatcher runs are safe: the store's `processing` flag keeps a claimed
//! notification out of a concurrent run's due set.

use chrono::Utc;
use log::*;
use tokio::task::JoinHandle;
use webhook_engine::{events::EventProducers, DispatchApi, SchedulerApi, SqliteDatabase};

const SCHEDULER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const DISPATCH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Starts the scheduler worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_scheduler_worker(db: SqliteDatabase) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(SCHEDULER_INTERVAL);
        let api = SchedulerApi::new(db);
        info!("🕰️ Notification scheduler worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running notification scheduler sweep");
            match api.run_sweep(Utc::now()).await {
                Ok(summary) if summary.is_empty() => {},
                Ok(summary) => info!("🕰️ Scheduler sweep complete. {summary}"),
                Err(e) => error!("🕰️ Error running notification scheduler sweep: {e}"),
            }
        }
    })
}

/// Starts the dispatch worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_dispatch_worker(db: SqliteDatabase, producers: EventProducers) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(DISPATCH_INTERVAL);
        let api = DispatchApi::new(db, producers);
        info!("🕰️ Webhook dispatch worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running webhook dispatch pass");
            match api.process_due(Utc::now()).await {
                Ok(summary) if summary.is_empty() => {},
                Ok(summary) => info!("🕰️ Dispatch pass complete. {summary}"),
                Err(e) => error!("🕰️ Error running webhook dispatch pass: {e}"),
            }
        }
    })
}
