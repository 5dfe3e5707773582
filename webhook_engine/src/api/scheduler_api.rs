//! The notification scheduler.
//!
//! A periodic sweep that gives every stored notification a processing slot, and rescues
//! notifications that fell through the cracks (a dispatcher that crashed mid-run, or rows that
//! were never picked up). It runs independently of the dispatcher; the two only meet through
//! the notification store.

use std::fmt::{Debug, Display};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{EventCode, Notification},
    traits::{NotificationManagement, WebhookGatewayError},
};

/// How long a due notification may sit unfinished before the rescue sweep considers it stuck.
pub const SKIPPED_GRACE_PERIOD: Duration = Duration::hours(24);

/// Backoff applied when rescheduling a stuck notification.
const SKIPPED_RESCHEDULE_DELAY: Duration = Duration::hours(1);

/// Delay between receipt and the first processing attempt. The gap lets related notifications
/// for the same transaction arrive first, and keeps the asynchronous path from racing the
/// synchronous payment-result flow. Follow-up events get a longer slot than authorisations
/// since their originals may still be in flight.
pub fn processing_delay(event_code: &EventCode) -> Duration {
    match event_code {
        EventCode::Capture
        | EventCode::CaptureFailed
        | EventCode::Refund
        | EventCode::RefundFailed => Duration::seconds(30),
        _ => Duration::seconds(5),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Fresh notifications that received a processing slot.
    pub scheduled: usize,
    /// Stuck notifications that were reset and given a new slot.
    pub rescued: usize,
    /// Notifications the sweep could not update. They stay as they are and are retried on the
    /// next sweep.
    pub failures: usize,
}

impl ScheduleSummary {
    pub fn is_empty(&self) -> bool {
        self.scheduled == 0 && self.rescued == 0 && self.failures == 0
    }
}

impl Display for ScheduleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} scheduled, {} rescued, {} failures",
            self.scheduled, self.rescued, self.failures
        )
    }
}

pub struct SchedulerApi<B> {
    db: B,
}

impl<B> Debug for SchedulerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SchedulerApi")
    }
}

impl<B> SchedulerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> SchedulerApi<B>
where B: NotificationManagement
{
    /// One scheduler sweep: assigns slots to fresh notifications, then rescues skipped ones.
    /// A failure on one notification never blocks the rest of the sweep.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<ScheduleSummary, WebhookGatewayError> {
        let mut summary = ScheduleSummary::default();
        let pending = self.db.fetch_unscheduled_notifications().await?;
        trace!("🗓️ {} unscheduled notifications fetched", pending.len());
        for notification in pending {
            let slot = notification.created_at + processing_delay(&notification.event_code);
            match self.db.set_schedule(notification.id, slot).await {
                Ok(()) => {
                    trace!("🗓️ Notification {} scheduled for {slot}", notification.id);
                    summary.scheduled += 1;
                },
                Err(e) => {
                    warn!("🗓️ Could not schedule notification {}: {e}", notification.id);
                    summary.failures += 1;
                },
            }
        }
        self.rescue_skipped(now, &mut summary).await?;
        Ok(summary)
    }

    /// Recovers notifications whose slot is more than [`SKIPPED_GRACE_PERIOD`] in the past and
    /// that still are not done. A set `processing` flag here means an earlier run crashed or
    /// timed out; it is reset so the row becomes claimable again.
    async fn rescue_skipped(
        &self,
        now: DateTime<Utc>,
        summary: &mut ScheduleSummary,
    ) -> Result<(), WebhookGatewayError> {
        let skipped = self.db.fetch_skipped_notifications(now, SKIPPED_GRACE_PERIOD).await?;
        if skipped.is_empty() {
            return Ok(());
        }
        info!("🗓️ {} skipped notifications found", skipped.len());
        for notification in skipped {
            match self.rescue_one(&notification, now).await {
                Ok(()) => summary.rescued += 1,
                Err(e) => {
                    warn!("🗓️ Could not rescue notification {}: {e}", notification.id);
                    summary.failures += 1;
                },
            }
        }
        Ok(())
    }

    async fn rescue_one(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookGatewayError> {
        if notification.processing {
            warn!(
                "🗓️ Notification {} was left in processing; assuming the previous run died and \
                 resetting it",
                notification.id
            );
            self.db.set_processing(notification.id, false).await?;
        }
        let slot = now + SKIPPED_RESCHEDULE_DELAY;
        self.db.set_schedule(notification.id, slot).await?;
        info!("🗓️ Skipped notification {} rescheduled for {slot}", notification.id);
        Ok(())
    }
}
