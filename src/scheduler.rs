//! Periodic lottery check over the event store.

use chrono::Utc;
use tracing::{error, info};

use crate::contract::{self, LotteryGateway};
use crate::database::Store;
use crate::error::Result;
use crate::types::{CheckSummary, DisasterEvent, EventOutcome, EventReport, LotteryStatus};

/// One scheduler pass: walk every record that has not ended, lazily
/// initialize lotteries the first time they are observed, and execute the
/// expired ones. A failure on one event never aborts the rest of the batch.
pub async fn run_scheduled_check(
    store: &Store,
    gateway: &dyn LotteryGateway,
    default_hours: i64,
) -> Result<CheckSummary> {
    let events = store.all_events()?;
    let candidates: Vec<DisasterEvent> = events
        .into_iter()
        .filter(|event| event.lottery_status != Some(LotteryStatus::Ended))
        .collect();

    if candidates.is_empty() {
        info!("no active lotteries to process");
        return Ok(CheckSummary {
            message: "No active lotteries found".to_string(),
            processed_events: 0,
            executed_lotteries: 0,
            errors: 0,
            results: Vec::new(),
        });
    }

    info!(events = candidates.len(), "checking lotteries");
    let mut results = Vec::with_capacity(candidates.len());
    for event in &candidates {
        let outcome = check_event(store, gateway, default_hours, event).await;
        results.push(EventReport {
            event_id: event.id.clone(),
            outcome,
        });
    }

    let executed = results
        .iter()
        .filter(|report| matches!(report.outcome, EventOutcome::Executed { .. }))
        .count();
    let errors = results
        .iter()
        .filter(|report| matches!(report.outcome, EventOutcome::Failed { .. }))
        .count();
    info!(executed, errors, "lottery check completed");

    Ok(CheckSummary {
        message: "Lottery check completed".to_string(),
        processed_events: results.len(),
        executed_lotteries: executed,
        errors,
        results,
    })
}

/// Classify a single event and execute its lottery if the window has passed.
pub async fn check_event(
    store: &Store,
    gateway: &dyn LotteryGateway,
    default_hours: i64,
    event: &DisasterEvent,
) -> EventOutcome {
    // first observation of this record starts its lottery window
    let event = if event.lottery_status.is_none() && event.disaster_hash.is_some() {
        match store.initialize_lottery(&event.id, default_hours) {
            Ok(Some(initialized)) => initialized,
            Ok(None) => {
                return EventOutcome::Skipped {
                    reason: "event no longer exists".to_string(),
                }
            }
            Err(err) => {
                return EventOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    } else {
        event.clone()
    };

    if event.lottery_status == Some(LotteryStatus::Ended) {
        return EventOutcome::Skipped {
            reason: "lottery already ended".to_string(),
        };
    }
    let (Some(end_time), Some(_)) = (event.lottery_end_time, event.disaster_hash.as_deref())
    else {
        return EventOutcome::Skipped {
            reason: "Missing lottery data".to_string(),
        };
    };

    let now = Utc::now();
    if now < end_time {
        let minutes_remaining = ((end_time - now).num_seconds() as f64 / 60.0).round() as i64;
        info!(event_id = %event.id, minutes_remaining, "lottery still running");
        return EventOutcome::Pending { minutes_remaining };
    }

    info!(event_id = %event.id, "lottery expired, executing");
    execute_expired(store, gateway, &event).await
}

/// Execution path shared by the scheduler, the timer service and the manual
/// trigger. The store claim comes first; the gateway is only called after
/// winning it, so concurrent executors collapse to one on-chain call.
pub async fn execute_expired(
    store: &Store,
    gateway: &dyn LotteryGateway,
    event: &DisasterEvent,
) -> EventOutcome {
    let Some(disaster_hash) = event.disaster_hash.as_deref() else {
        return EventOutcome::Skipped {
            reason: "Missing lottery data".to_string(),
        };
    };
    let claimed = match store.claim_for_execution(&event.id) {
        Ok(claimed) => claimed,
        Err(err) => {
            return EventOutcome::Failed {
                error: err.to_string(),
            }
        }
    };
    if !claimed {
        return EventOutcome::Skipped {
            reason: "lottery already ended".to_string(),
        };
    }

    match contract::execute_lottery(gateway, disaster_hash).await {
        Ok(outcome) => {
            if let Err(err) = store.record_success(&event.id, &outcome) {
                // the on-chain call went through but the record will not
                // reflect it; there is no reconciliation path for this
                let error = format!("lottery executed but the result could not be stored: {err}");
                error!(event_id = %event.id, "{error}");
                return EventOutcome::Failed { error };
            }
            info!(
                event_id = %event.id,
                winner = %outcome.winner,
                tx_hash = %outcome.transaction_hash,
                "lottery executed"
            );
            EventOutcome::Executed {
                winner: outcome.winner,
                transaction_hash: outcome.transaction_hash,
            }
        }
        Err(err) => {
            let message = err.to_string();
            if let Err(store_err) = store.record_failure(&event.id, &message) {
                error!(event_id = %event.id, "failed to record lottery failure: {store_err}");
            }
            error!(event_id = %event.id, "lottery execution failed: {message}");
            EventOutcome::Failed { error: message }
        }
    }
}
