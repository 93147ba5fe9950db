use thiserror::Error;

/// Errors raised by the brokerage client. Snapshot queries failing with one
/// of these aborts the whole planning cycle; order submissions failing with
/// one are recorded per-action and the batch continues.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Broker API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Broker response parse error: {0}")]
    Parse(String),
}

/// Errors from the news/price/LLM providers. Always recoverable: the caller
/// skips the affected symbol or falls back to a degraded default.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("No data available for {0}")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient inventory for {symbol}: requested {requested}, held {held}")]
    InsufficientInventory {
        symbol: String,
        requested: f64,
        held: f64,
    },
}

/// A cycle-level failure. Only load-bearing broker snapshots abort a cycle;
/// everything upstream degrades in place.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Broker snapshot failed: {0}")]
    Broker(#[from] BrokerError),
}
