//! Error types for the lottery coordinator.

use thiserror::Error;

/// Errors raised while checking or executing lotteries.
#[derive(Debug, Error)]
pub enum Error {
    /// Event store error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored timestamp could not be parsed back.
    #[error("corrupt timestamp in stored event: {0}")]
    Timestamp(String),

    /// Lookup for an unknown event id.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Disaster hash is not a 0x-prefixed 64 digit hex string.
    #[error("invalid disaster hash: {0}")]
    InvalidDisasterHash(String),

    /// No signing credential was configured for the gateway.
    #[error("gateway signing credential not configured")]
    MissingCredential,

    /// The gateway could not be reached or returned garbage.
    #[error("gateway request failed: {0}")]
    Gateway(String),

    /// The gateway reached the chain but the call itself failed.
    #[error("lottery contract call failed: {0}")]
    Contract(String),

    /// Transaction mined but the receipt carries no LotteryWinner event.
    #[error("LotteryWinner event not found in transaction receipt")]
    WinnerEventMissing,
}

/// Result type for lottery operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Gateway(err.to_string())
    }
}
