use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderSide;
use super::plan::AllocationPlan;
use super::signal::SignalCategory;

/// One successfully submitted order, as recorded in the audit store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub order_id: String,
    pub status: String,
    pub strength: f64,
    pub reasoning: String,
    pub category: SignalCategory,
    pub price_allocation: f64,
}

/// A submission the broker rejected. Reported, not persisted with an order
/// id; the rest of the batch continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub error: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub executed_actions: Vec<ExecutedAction>,
    pub failed_actions: Vec<FailedAction>,
    pub total_bought: f64,
    pub total_sold: f64,
    pub orders_placed: usize,
    pub orders_failed: usize,
    pub success_rate: f64,
    pub final_cash: f64,
    pub final_portfolio_value: f64,
    pub summary: String,
}

/// The full JSON-serializable outcome of one cycle. Contains no live broker
/// handles; safe to hand straight to an HTTP layer or log sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plan: AllocationPlan,
    pub execution: ExecutionReport,
}
