use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a disaster lottery. A record without the field has not been
/// observed by the scheduler or the timer service yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotteryStatus {
    Active,
    Ended,
}

impl LotteryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotteryStatus::Active => "active",
            LotteryStatus::Ended => "ended",
        }
    }
}

/// One disaster relief campaign record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub disaster_location: String,
    pub estimated_amount_required: f64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    /// Correlation key to the on-chain disaster entry. Absent means the
    /// lottery machinery never touches this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disaster_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_status: Option<LotteryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_duration_hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_winner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_prize_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_participant_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_gas_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lottery_error: Option<String>,
}

/// Intake payload for a new disaster event.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub disaster_location: String,
    pub estimated_amount_required: f64,
    pub source: String,
    pub tweet_id: Option<String>,
    pub disaster_hash: Option<String>,
    pub lottery_duration_hours: Option<i64>,
}

/// Outcome of one successful on-chain lottery call. An empty `winner` means
/// the contract resolved a lottery nobody donated to.
#[derive(Debug, Clone, Serialize)]
pub struct LotteryOutcome {
    pub winner: String,
    pub participant_count: u64,
    pub prize_amount: Option<f64>,
    pub transaction_hash: String,
    pub gas_used: Option<String>,
}

/// Per-event classification for one scheduler pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventOutcome {
    Skipped {
        reason: String,
    },
    Pending {
        #[serde(rename = "minutesRemaining")]
        minutes_remaining: i64,
    },
    Executed {
        winner: String,
        #[serde(rename = "txHash")]
        transaction_hash: String,
    },
    Failed {
        error: String,
    },
}

/// One entry in the scheduler summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReport {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(flatten)]
    pub outcome: EventOutcome,
}

/// Batch summary returned by the scheduler entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub message: String,
    pub processed_events: usize,
    pub executed_lotteries: usize,
    pub errors: usize,
    pub results: Vec<EventReport>,
}
