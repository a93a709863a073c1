//! In-process lottery timers, one armed task per running lottery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::contract::LotteryGateway;
use crate::database::Store;
use crate::error::{Error, Result};
use crate::scheduler;
use crate::types::{DisasterEvent, EventOutcome, LotteryStatus};

struct ArmedTimer {
    end_time: DateTime<Utc>,
    handle: JoinHandle<()>,
}

struct TimerInner {
    store: Arc<Store>,
    gateway: Arc<dyn LotteryGateway>,
    default_duration_hours: i64,
    timers: Mutex<HashMap<String, ArmedTimer>>,
}

/// Coordinator owning every armed lottery timer in this process. Timers are
/// re-derived from the stored end times at startup, so nothing about them
/// survives a restart on purpose. A fired timer goes through the same store
/// claim as the scheduler, so the two never double-execute a lottery.
#[derive(Clone)]
pub struct LotteryTimers {
    inner: Arc<TimerInner>,
}

impl LotteryTimers {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<dyn LotteryGateway>,
        default_duration_hours: i64,
    ) -> Self {
        LotteryTimers {
            inner: Arc::new(TimerInner {
                store,
                gateway,
                default_duration_hours,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Walk the whole store and set up timers for every running lottery.
    pub async fn initialize(&self) -> Result<()> {
        let events = self.inner.store.all_events()?;
        info!(events = events.len(), "loading lottery timers");
        for event in &events {
            if let Err(err) = self.watch(event).await {
                error!(event_id = %event.id, "failed to set up lottery timer: {err}");
            }
        }
        Ok(())
    }

    /// Track one event: initialize its lottery on first observation, then
    /// arm a timer for the remaining window, or execute right away when the
    /// window has already passed.
    pub async fn watch(&self, event: &DisasterEvent) -> Result<()> {
        if event.disaster_hash.is_none() {
            return Ok(());
        }
        let event = if event.lottery_status.is_none() {
            match self
                .inner
                .store
                .initialize_lottery(&event.id, self.inner.default_duration_hours)?
            {
                Some(initialized) => initialized,
                None => return Ok(()),
            }
        } else {
            event.clone()
        };

        match (event.lottery_status, event.lottery_end_time) {
            (Some(LotteryStatus::Active), Some(end_time)) if Utc::now() >= end_time => {
                info!(event_id = %event.id, "lottery already expired, executing");
                let outcome = scheduler::execute_expired(
                    &self.inner.store,
                    self.inner.gateway.as_ref(),
                    &event,
                )
                .await;
                self.clear(&event.id).await;
                log_outcome(&event.id, &outcome);
            }
            (Some(LotteryStatus::Active), Some(end_time)) => {
                self.arm(&event.id, end_time).await;
            }
            (Some(LotteryStatus::Ended), _) => {
                self.clear(&event.id).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Remaining window of an armed timer, for UI countdowns.
    pub async fn remaining_ms(&self, event_id: &str) -> Option<i64> {
        let timers = self.inner.timers.lock().await;
        timers
            .get(event_id)
            .map(|timer| (timer.end_time - Utc::now()).num_milliseconds().max(0))
    }

    /// Operator escape hatch: resolve a lottery right now, without waiting
    /// for its timer.
    pub async fn execute_now(&self, event_id: &str) -> Result<EventOutcome> {
        let event = self
            .inner
            .store
            .get_event(event_id)?
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;
        info!(event_id, "manually executing lottery");
        let outcome =
            scheduler::execute_expired(&self.inner.store, self.inner.gateway.as_ref(), &event)
                .await;
        self.clear(event_id).await;
        Ok(outcome)
    }

    /// Cancel every armed timer.
    pub async fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().await;
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        info!("lottery timer service stopped");
    }

    async fn arm(&self, event_id: &str, end_time: DateTime<Utc>) {
        let mut timers = self.inner.timers.lock().await;
        if let Some(existing) = timers.remove(event_id) {
            existing.handle.abort();
        }
        let delay = (end_time - Utc::now()).to_std().unwrap_or_default();
        let inner = Arc::clone(&self.inner);
        let id = event_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(inner, id).await;
        });
        let minutes_remaining = ((end_time - Utc::now()).num_seconds() as f64 / 60.0).round();
        info!(event_id, minutes_remaining, "armed lottery timer");
        timers.insert(event_id.to_string(), ArmedTimer { end_time, handle });
    }

    async fn clear(&self, event_id: &str) {
        let mut timers = self.inner.timers.lock().await;
        if let Some(timer) = timers.remove(event_id) {
            timer.handle.abort();
        }
    }
}

async fn fire(inner: Arc<TimerInner>, event_id: String) {
    info!(event_id = %event_id, "lottery timer fired");
    match inner.store.get_event(&event_id) {
        Ok(Some(event)) if event.lottery_status == Some(LotteryStatus::Active) => {
            let outcome =
                scheduler::execute_expired(&inner.store, inner.gateway.as_ref(), &event).await;
            log_outcome(&event_id, &outcome);
        }
        Ok(_) => {}
        Err(err) => error!(event_id = %event_id, "failed to load event for fired timer: {err}"),
    }
    inner.timers.lock().await.remove(&event_id);
}

fn log_outcome(event_id: &str, outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Executed {
            winner,
            transaction_hash,
        } => info!(event_id, winner = %winner, tx_hash = %transaction_hash, "lottery resolved"),
        EventOutcome::Failed { error } => error!(event_id, "lottery failed: {error}"),
        EventOutcome::Skipped { reason } => info!(event_id, reason = %reason, "lottery not executed"),
        EventOutcome::Pending { minutes_remaining } => {
            info!(event_id, minutes_remaining = *minutes_remaining, "lottery still running")
        }
    }
}
