use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use common::error::CycleError;
use common::models::CycleReport;
use common::traits::{Broker, NewsFeed, PriceFeed, SignalModel};
use market_data::services::signal_service::SignalService;

use super::execution_service::ExecutionService;

/// Drives one full cycle: broker snapshots, signal collection, planning,
/// execution. Snapshot failures abort the cycle; everything upstream of the
/// broker degrades in place and the cycle carries on.
pub struct CycleService<B, N, P, M> {
    broker: B,
    prices: P,
    signals: SignalService<N, P, M>,
    executor: ExecutionService<B>,
}

impl<B, N, P, M> CycleService<B, N, P, M>
where
    B: Broker,
    N: NewsFeed,
    P: PriceFeed,
    M: SignalModel,
{
    pub fn new(
        broker: B,
        prices: P,
        signals: SignalService<N, P, M>,
        executor: ExecutionService<B>,
    ) -> Self {
        Self {
            broker,
            prices,
            signals,
            executor,
        }
    }

    pub async fn run_cycle(
        &self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();

        let account = self.broker.get_account().await?;
        let positions = self.broker.get_positions().await?;
        let pending_orders = self.broker.get_pending_orders().await?;
        info!(
            "Account snapshot: cash=${:.2} buying_power=${:.2} portfolio=${:.2}, {} positions, {} pending orders",
            account.cash,
            account.buying_power,
            account.portfolio_value,
            positions.len(),
            pending_orders.len()
        );

        let signals = self.signals.collect(&positions).await;

        let plan = strategy::build_plan(
            &account,
            &positions,
            &pending_orders,
            &signals,
            &self.prices,
        )
        .await;
        info!("{}", plan.reasoning);

        let execution = self.executor.execute(&plan, cancel).await;
        info!("{}", execution.summary);

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            plan,
            execution,
        })
    }
}
