//! Embedded event store for disaster records.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use native_db::*;
use native_model::{native_model, Model};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{CreateEventRequest, DisasterEvent, LotteryOutcome, LotteryStatus};

static MODELS: Lazy<Models> = Lazy::new(|| {
    let mut models = Models::new();
    models.define::<StoredEvent>().unwrap();
    models
});

/// Storage row for a disaster event. Timestamps are kept as RFC 3339 strings
/// and the status as a plain string (empty while the lottery is
/// uninitialized) so the secondary index can scan on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredEvent {
    #[primary_key]
    pub id: String,
    #[secondary_key]
    pub lottery_status: String,
    pub title: String,
    pub description: String,
    pub disaster_location: String,
    pub estimated_amount_required: f64,
    pub source: String,
    pub tweet_id: Option<String>,
    pub disaster_hash: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub lottery_duration_hours: Option<i64>,
    pub lottery_end_time: Option<String>,
    pub lottery_winner: Option<String>,
    pub lottery_prize_amount: Option<f64>,
    pub lottery_transaction_hash: Option<String>,
    pub lottery_participant_count: Option<u64>,
    pub lottery_gas_used: Option<String>,
    pub lottery_error: Option<String>,
}

impl StoredEvent {
    fn from_event(event: &DisasterEvent) -> Self {
        StoredEvent {
            id: event.id.clone(),
            lottery_status: event
                .lottery_status
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            title: event.title.clone(),
            description: event.description.clone(),
            disaster_location: event.disaster_location.clone(),
            estimated_amount_required: event.estimated_amount_required,
            source: event.source.clone(),
            tweet_id: event.tweet_id.clone(),
            disaster_hash: event.disaster_hash.clone(),
            created_at: event.created_at.to_rfc3339(),
            updated_at: event.updated_at.map(|ts| ts.to_rfc3339()),
            lottery_duration_hours: event.lottery_duration_hours,
            lottery_end_time: event.lottery_end_time.map(|ts| ts.to_rfc3339()),
            lottery_winner: event.lottery_winner.clone(),
            lottery_prize_amount: event.lottery_prize_amount,
            lottery_transaction_hash: event.lottery_transaction_hash.clone(),
            lottery_participant_count: event.lottery_participant_count,
            lottery_gas_used: event.lottery_gas_used.clone(),
            lottery_error: event.lottery_error.clone(),
        }
    }

    fn into_event(self) -> Result<DisasterEvent> {
        Ok(DisasterEvent {
            lottery_status: parse_status(&self.lottery_status)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: self.updated_at.as_deref().map(parse_ts).transpose()?,
            lottery_end_time: self.lottery_end_time.as_deref().map(parse_ts).transpose()?,
            id: self.id,
            title: self.title,
            description: self.description,
            disaster_location: self.disaster_location,
            estimated_amount_required: self.estimated_amount_required,
            source: self.source,
            tweet_id: self.tweet_id,
            disaster_hash: self.disaster_hash,
            lottery_duration_hours: self.lottery_duration_hours,
            lottery_winner: self.lottery_winner,
            lottery_prize_amount: self.lottery_prize_amount,
            lottery_transaction_hash: self.lottery_transaction_hash,
            lottery_participant_count: self.lottery_participant_count,
            lottery_gas_used: self.lottery_gas_used,
            lottery_error: self.lottery_error,
        })
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| Error::Timestamp(format!("{raw}: {err}")))
}

fn parse_status(raw: &str) -> Result<Option<LotteryStatus>> {
    match raw {
        "" => Ok(None),
        "active" => Ok(Some(LotteryStatus::Active)),
        "ended" => Ok(Some(LotteryStatus::Ended)),
        other => Err(Error::Database(format!("unknown lottery status: {other}"))),
    }
}

/// Event store. All lottery state transitions go through the read-write
/// transactions here, which serializes them against each other.
pub struct Store {
    db: Database<'static>,
}

impl Store {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|err| Error::Database(err.to_string()))?;
        Ok(Store { db })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|err| Error::Database(err.to_string()))?;
        Ok(Store { db })
    }

    /// Create a record from an intake request, assigning id and creation
    /// time.
    pub fn create_event(&self, req: CreateEventRequest) -> Result<DisasterEvent> {
        let event = DisasterEvent {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            description: req.description,
            disaster_location: req.disaster_location,
            estimated_amount_required: req.estimated_amount_required,
            source: req.source,
            tweet_id: req.tweet_id,
            disaster_hash: req.disaster_hash,
            created_at: Utc::now(),
            updated_at: None,
            lottery_status: None,
            lottery_duration_hours: req.lottery_duration_hours,
            lottery_end_time: None,
            lottery_winner: None,
            lottery_prize_amount: None,
            lottery_transaction_hash: None,
            lottery_participant_count: None,
            lottery_gas_used: None,
            lottery_error: None,
        };
        self.put_event(&event)?;
        Ok(event)
    }

    /// Whole-record overwrite.
    pub fn put_event(&self, event: &DisasterEvent) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredEvent::from_event(event))?;
        rw.commit()?;
        Ok(())
    }

    /// Keyed read.
    pub fn get_event(&self, id: &str) -> Result<Option<DisasterEvent>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredEvent> = r.get().primary(id.to_string())?;
        stored.map(StoredEvent::into_event).transpose()
    }

    /// All events, newest first.
    pub fn all_events(&self) -> Result<Vec<DisasterEvent>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredEvent>()?;
        let iter = scan.all()?;
        let rows: std::result::Result<Vec<StoredEvent>, _> = iter.collect();
        let rows = rows.map_err(|err| Error::Database(err.to_string()))?;
        let mut events = rows
            .into_iter()
            .map(StoredEvent::into_event)
            .collect::<Result<Vec<_>>>()?;
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// Events whose lottery is currently running.
    pub fn active_events(&self) -> Result<Vec<DisasterEvent>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredEvent>(StoredEventKey::lottery_status)?;
        let iter = scan.start_with(LotteryStatus::Active.as_str())?;
        let rows: std::result::Result<Vec<StoredEvent>, _> = iter.collect();
        let rows = rows.map_err(|err| Error::Database(err.to_string()))?;
        rows.into_iter().map(StoredEvent::into_event).collect()
    }

    /// Lazily start the lottery for a record that has never been observed:
    /// sets status active and `lottery_end_time = created_at + duration`.
    /// Does nothing when the status is already set or the record has no
    /// disaster hash, so re-running it before expiry is a no-op.
    pub fn initialize_lottery(&self, id: &str, default_hours: i64) -> Result<Option<DisasterEvent>> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredEvent> = rw.get().primary(id.to_string())?;
        let Some(stored) = stored else {
            return Ok(None);
        };
        if !stored.lottery_status.is_empty() || stored.disaster_hash.is_none() {
            return stored.into_event().map(Some);
        }
        let created_at = parse_ts(&stored.created_at)?;
        let duration = stored.lottery_duration_hours.unwrap_or(default_hours);
        let end_time = created_at + Duration::hours(duration);
        let mut updated = stored;
        updated.lottery_status = LotteryStatus::Active.as_str().to_string();
        updated.lottery_duration_hours = Some(duration);
        updated.lottery_end_time = Some(end_time.to_rfc3339());
        rw.upsert(updated.clone())?;
        rw.commit()?;
        updated.into_event().map(Some)
    }

    /// Transition `active -> ended`, but only if the record is still active.
    /// Returns whether the caller won the transition. Executors must win
    /// this claim before calling the gateway; it is what keeps two racing
    /// schedulers down to one on-chain call per disaster.
    pub fn claim_for_execution(&self, id: &str) -> Result<bool> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredEvent> = rw.get().primary(id.to_string())?;
        let Some(mut stored) = stored else {
            return Ok(false);
        };
        if stored.lottery_status != LotteryStatus::Active.as_str() {
            return Ok(false);
        }
        stored.lottery_status = LotteryStatus::Ended.as_str().to_string();
        stored.updated_at = Some(Utc::now().to_rfc3339());
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(true)
    }

    /// Write back a successful execution.
    pub fn record_success(&self, id: &str, outcome: &LotteryOutcome) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredEvent> = rw.get().primary(id.to_string())?;
        let Some(mut stored) = stored else {
            return Err(Error::EventNotFound(id.to_string()));
        };
        stored.lottery_status = LotteryStatus::Ended.as_str().to_string();
        stored.lottery_winner = Some(outcome.winner.clone());
        stored.lottery_participant_count = Some(outcome.participant_count);
        stored.lottery_prize_amount = outcome.prize_amount;
        stored.lottery_transaction_hash = Some(outcome.transaction_hash.clone());
        stored.lottery_gas_used = outcome.gas_used.clone();
        stored.updated_at = Some(Utc::now().to_rfc3339());
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(())
    }

    /// Write back a failed execution. The record still ends; nothing retries
    /// it automatically.
    pub fn record_failure(&self, id: &str, error: &str) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredEvent> = rw.get().primary(id.to_string())?;
        let Some(mut stored) = stored else {
            return Err(Error::EventNotFound(id.to_string()));
        };
        stored.lottery_status = LotteryStatus::Ended.as_str().to_string();
        stored.lottery_error = Some(error.to_string());
        stored.updated_at = Some(Utc::now().to_rfc3339());
        rw.upsert(stored)?;
        rw.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    fn event_created_hours_ago(id: &str, hours: i64, hash: Option<&str>) -> DisasterEvent {
        DisasterEvent {
            id: id.to_string(),
            title: format!("Disaster {id}"),
            description: "Flooding across the coastal region".to_string(),
            disaster_location: "Valencia, Spain".to_string(),
            estimated_amount_required: 250_000.0,
            source: "reuters".to_string(),
            tweet_id: None,
            disaster_hash: hash.map(str::to_string),
            created_at: Utc::now() - Duration::hours(hours),
            updated_at: None,
            lottery_status: None,
            lottery_duration_hours: None,
            lottery_end_time: None,
            lottery_winner: None,
            lottery_prize_amount: None,
            lottery_transaction_hash: None,
            lottery_participant_count: None,
            lottery_gas_used: None,
            lottery_error: None,
        }
    }

    const HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn test_put_get_round_trip() {
        let store = store();
        let event = event_created_hours_ago("ev-1", 1, Some(HASH));
        store.put_event(&event).unwrap();

        let loaded = store.get_event("ev-1").unwrap().unwrap();
        assert_eq!(loaded.id, event.id);
        assert_eq!(loaded.disaster_hash, event.disaster_hash);
        assert_eq!(loaded.lottery_status, None);
        assert_eq!(loaded.created_at, event.created_at);
    }

    #[test]
    fn test_create_event_assigns_id_and_created_at() {
        let store = store();
        let req = CreateEventRequest {
            title: "Earthquake".to_string(),
            description: "7.1 magnitude".to_string(),
            disaster_location: "Tokyo, Japan".to_string(),
            estimated_amount_required: 1_000_000.0,
            source: "ap".to_string(),
            tweet_id: None,
            disaster_hash: Some(HASH.to_string()),
            lottery_duration_hours: None,
        };
        let event = store.create_event(req).unwrap();
        assert!(!event.id.is_empty());
        assert!(store.get_event(&event.id).unwrap().is_some());
    }

    #[test]
    fn test_initialize_sets_end_time_from_created_at() {
        let store = store();
        let event = event_created_hours_ago("ev-1", 1, Some(HASH));
        store.put_event(&event).unwrap();

        let updated = store.initialize_lottery("ev-1", 72).unwrap().unwrap();
        assert_eq!(updated.lottery_status, Some(LotteryStatus::Active));
        assert_eq!(updated.lottery_duration_hours, Some(72));
        assert_eq!(
            updated.lottery_end_time.unwrap(),
            event.created_at + Duration::hours(72)
        );
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 1, Some(HASH)))
            .unwrap();

        let first = store.initialize_lottery("ev-1", 72).unwrap().unwrap();
        let second = store.initialize_lottery("ev-1", 48).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_initialize_skips_events_without_hash() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 100, None))
            .unwrap();

        let unchanged = store.initialize_lottery("ev-1", 72).unwrap().unwrap();
        assert_eq!(unchanged.lottery_status, None);
        assert_eq!(unchanged.lottery_end_time, None);
    }

    #[test]
    fn test_initialize_missing_event() {
        let store = store();
        assert!(store.initialize_lottery("nope", 72).unwrap().is_none());
    }

    #[test]
    fn test_claim_succeeds_exactly_once() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 73, Some(HASH)))
            .unwrap();
        store.initialize_lottery("ev-1", 72).unwrap();

        assert!(store.claim_for_execution("ev-1").unwrap());
        assert!(!store.claim_for_execution("ev-1").unwrap());

        let event = store.get_event("ev-1").unwrap().unwrap();
        assert_eq!(event.lottery_status, Some(LotteryStatus::Ended));
    }

    #[test]
    fn test_claim_requires_active_status() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 1, Some(HASH)))
            .unwrap();
        // never initialized, so not active
        assert!(!store.claim_for_execution("ev-1").unwrap());
        assert!(!store.claim_for_execution("missing").unwrap());
    }

    #[test]
    fn test_active_scan_only_returns_active() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-active", 1, Some(HASH)))
            .unwrap();
        store
            .put_event(&event_created_hours_ago("ev-bare", 1, Some(HASH)))
            .unwrap();
        store.initialize_lottery("ev-active", 72).unwrap();

        let active = store.active_events().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "ev-active");

        store.claim_for_execution("ev-active").unwrap();
        assert!(store.active_events().unwrap().is_empty());
    }

    #[test]
    fn test_all_events_newest_first() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-old", 10, None))
            .unwrap();
        store
            .put_event(&event_created_hours_ago("ev-new", 1, None))
            .unwrap();

        let events = store.all_events().unwrap();
        assert_eq!(events[0].id, "ev-new");
        assert_eq!(events[1].id, "ev-old");
    }

    #[test]
    fn test_record_success_round_trip() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 73, Some(HASH)))
            .unwrap();
        store.initialize_lottery("ev-1", 72).unwrap();
        store.claim_for_execution("ev-1").unwrap();

        let outcome = LotteryOutcome {
            winner: "0xabcdef0123456789abcdef0123456789abcdef01".to_string(),
            participant_count: 12,
            prize_amount: Some(42.5),
            transaction_hash: "0xfeed".to_string(),
            gas_used: Some("21000".to_string()),
        };
        store.record_success("ev-1", &outcome).unwrap();

        let event = store.get_event("ev-1").unwrap().unwrap();
        assert_eq!(event.lottery_status, Some(LotteryStatus::Ended));
        assert_eq!(event.lottery_winner.as_deref(), Some(outcome.winner.as_str()));
        assert_eq!(event.lottery_participant_count, Some(12));
        assert_eq!(event.lottery_transaction_hash.as_deref(), Some("0xfeed"));
        assert_eq!(event.lottery_gas_used.as_deref(), Some("21000"));
        assert!(event.updated_at.is_some());
    }

    #[test]
    fn test_record_failure_sets_error_only() {
        let store = store();
        store
            .put_event(&event_created_hours_ago("ev-1", 73, Some(HASH)))
            .unwrap();
        store.initialize_lottery("ev-1", 72).unwrap();
        store.claim_for_execution("ev-1").unwrap();

        store
            .record_failure("ev-1", "insufficient funds for gas")
            .unwrap();

        let event = store.get_event("ev-1").unwrap().unwrap();
        assert_eq!(event.lottery_status, Some(LotteryStatus::Ended));
        assert_eq!(
            event.lottery_error.as_deref(),
            Some("insufficient funds for gas")
        );
        assert_eq!(event.lottery_winner, None);
        assert_eq!(event.lottery_transaction_hash, None);
    }
}
