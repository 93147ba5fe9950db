use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::order::OrderSide;
use super::signal::SignalCategory;

/// A single planned trade. Immutable once constructed; becomes the
/// executor's work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationAction {
    pub symbol: String,
    pub side: OrderSide,
    /// Whole shares.
    pub quantity: i64,
    /// Dollars committed (buys) or expected proceeds (sells).
    pub price_allocation: f64,
    pub strength: f64,
    pub reasoning: String,
    pub category: SignalCategory,
}

/// The finalized output of one planning pass. Pure data; holds the
/// pending-order maps so the executor can double-check deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub actions: Vec<AllocationAction>,
    pub cash_available: f64,
    /// Projected cash after the plan settles; always >= 0.
    pub cash_remaining: f64,
    /// Sell proceeds plus buy allocation.
    pub total_allocation: f64,
    pub portfolio_value: f64,
    pub num_actions: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub pending_buys: BTreeMap<String, f64>,
    pub pending_sells: BTreeMap<String, f64>,
    pub reasoning: String,
}

impl AllocationPlan {
    pub fn buys(&self) -> impl Iterator<Item = &AllocationAction> {
        self.actions.iter().filter(|a| a.side == OrderSide::Buy)
    }

    pub fn sells(&self) -> impl Iterator<Item = &AllocationAction> {
        self.actions.iter().filter(|a| a.side == OrderSide::Sell)
    }
}
