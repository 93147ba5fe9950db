use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use common::models::{
    AllocationAction, AllocationPlan, ExecutedAction, ExecutionReport, FailedAction, OrderSide,
};
use common::traits::Broker;
use storage::ledger::PositionLedger;
use storage::repositories::actions_repo::ActionsRepository;

/// Submits a plan's market orders and assembles the execution report.
/// Partial failure is the normal case: each rejection is recorded and the
/// batch continues. There is no rollback.
pub struct ExecutionService<B> {
    broker: B,
    pool: SqlitePool,
    ledger: Arc<Mutex<PositionLedger>>,
}

impl<B: Broker> ExecutionService<B> {
    pub fn new(broker: B, pool: SqlitePool, ledger: Arc<Mutex<PositionLedger>>) -> Self {
        Self {
            broker,
            pool,
            ledger,
        }
    }

    /// Sells go first so their proceeds are settling while the buys land.
    /// The cancellation flag is honored between submissions, never
    /// mid-order.
    pub async fn execute(
        &self,
        plan: &AllocationPlan,
        cancel: &watch::Receiver<bool>,
    ) -> ExecutionReport {
        let mut executed: Vec<ExecutedAction> = Vec::new();
        let mut failed: Vec<FailedAction> = Vec::new();
        let mut total_bought = 0.0;
        let mut total_sold = 0.0;

        info!(
            "Executing plan: {} sells, then {} buys",
            plan.sell_count, plan.buy_count
        );

        for action in plan.sells().chain(plan.buys()) {
            if *cancel.borrow() {
                warn!(
                    "Shutdown requested; stopping execution after {} submissions",
                    executed.len() + failed.len()
                );
                break;
            }

            let submission = match action.side {
                OrderSide::Sell => self.broker.market_sell(&action.symbol, action.quantity).await,
                OrderSide::Buy => self.broker.market_buy(&action.symbol, action.quantity).await,
            };

            match submission {
                Ok(receipt) => {
                    info!(
                        "{} {} {} submitted (order {}, {})",
                        action.side.as_str(),
                        action.quantity,
                        action.symbol,
                        receipt.id,
                        receipt.status
                    );
                    let done = ExecutedAction {
                        symbol: action.symbol.clone(),
                        side: action.side,
                        quantity: action.quantity,
                        order_id: receipt.id,
                        status: receipt.status,
                        strength: action.strength,
                        reasoning: action.reasoning.clone(),
                        category: action.category,
                        price_allocation: action.price_allocation,
                    };
                    match action.side {
                        OrderSide::Buy => total_bought += action.price_allocation,
                        OrderSide::Sell => total_sold += action.price_allocation,
                    }

                    if let Err(e) = ActionsRepository::save_action(&self.pool, &done).await {
                        warn!("Audit write failed for {} (continuing): {}", done.symbol, e);
                    }
                    self.mirror_fill(action).await;
                    executed.push(done);
                }
                Err(e) => {
                    warn!(
                        "{} {} {} rejected: {}",
                        action.side.as_str(),
                        action.quantity,
                        action.symbol,
                        e
                    );
                    failed.push(FailedAction {
                        symbol: action.symbol.clone(),
                        side: action.side,
                        quantity: action.quantity,
                        error: e.to_string(),
                        reasoning: action.reasoning.clone(),
                    });
                }
            }
        }

        let (final_cash, final_portfolio_value) = match self.broker.get_account().await {
            Ok(account) => (account.cash, account.portfolio_value),
            Err(e) => {
                warn!(
                    "Post-execution account refetch failed; using plan projections: {}",
                    e
                );
                (plan.cash_remaining, plan.portfolio_value)
            }
        };

        let orders_placed = executed.len();
        let orders_failed = failed.len();
        let submitted = orders_placed + orders_failed;
        let success_rate = if submitted > 0 {
            orders_placed as f64 / submitted as f64
        } else {
            0.0
        };
        let summary = format!(
            "Executed {} orders ({} buys, {} sells). {} failed.",
            orders_placed, plan.buy_count, plan.sell_count, orders_failed
        );

        ExecutionReport {
            executed_actions: executed,
            failed_actions: failed,
            total_bought,
            total_sold,
            orders_placed,
            orders_failed,
            success_rate,
            final_cash,
            final_portfolio_value,
            summary,
        }
    }

    /// Reflects a submitted fill into the local lot ledger. The broker stays
    /// the source of truth; a mirror mismatch is logged, never escalated.
    async fn mirror_fill(&self, action: &AllocationAction) {
        if action.quantity <= 0 {
            return;
        }
        let price = action.price_allocation / action.quantity as f64;
        let mut ledger = self.ledger.lock().await;
        match action.side {
            OrderSide::Buy => ledger.buy(&action.symbol, action.quantity as f64, price),
            OrderSide::Sell => {
                if let Err(e) = ledger.sell(&action.symbol, action.quantity as f64, price) {
                    warn!("Ledger mirror out of sync for {}: {}", action.symbol, e);
                }
            }
        }
    }
}
