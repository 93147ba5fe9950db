use serde::{Deserialize, Serialize};

/// Read-only view of the brokerage account, fetched fresh at the start of
/// every planning cycle. Never cached across cycles: the budget math must
/// see the latest broker state or it can overdraft against stale cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub cash: f64,
    /// Capital available for new positions; may exceed cash via margin.
    pub buying_power: f64,
    pub portfolio_value: f64,
    pub equity: f64,
}
