use std::collections::{BTreeMap, BTreeSet};

use common::models::{
    AccountSnapshot, AllocationAction, AllocationPlan, OrderSide, PendingOrder, Position,
    SignalAction, SignalCategory, SignalSet,
};
use common::traits::PriceFeed;
use tracing::{error, info, warn};

use crate::normalizer;

/// Sell signals below this conviction are ignored to avoid churn.
pub const SELL_STRENGTH_THRESHOLD: f64 = 0.7;
/// Margin-safety cushion: never deploy the reserve.
pub const RESERVE_FLOOR: f64 = 1_000.0;
pub const RESERVE_FRACTION: f64 = 0.25;
/// Diversification cap per single position.
pub const MAX_POSITION_FRACTION: f64 = 0.08;
/// Fraction of freed-up cash deployable in one cycle.
pub const DEPLOY_FRACTION: f64 = 0.6;
/// Circuit breaker: one cycle touches at most this share of buying power.
pub const POWER_CAP_FRACTION: f64 = 0.4;
/// Dust-order floor.
pub const MIN_TRADE_DOLLARS: f64 = 50.0;
/// Low-conviction buys still get a minimum weight slice.
pub const MIN_WEIGHT: f64 = 0.5;

/// Builds the bounded cash-allocation plan for one cycle.
///
/// Sells are sized first (their proceeds feed the buy budget), then the
/// budget is distributed over the prioritized candidates proportional to
/// signal strength, subject to the per-position and total caps. The result
/// upholds, for any input: `cash_remaining >= 0`, no order for a symbol
/// with a pending order of the same side, and
/// `sum(buy allocations) <= min(0.6 * available, 0.4 * buying_power)`.
pub async fn build_plan(
    account: &AccountSnapshot,
    positions: &[Position],
    pending_orders: &[PendingOrder],
    signals: &SignalSet,
    price_feed: &dyn PriceFeed,
) -> AllocationPlan {
    let cash_available = account.cash;
    let buying_power = account.buying_power;
    let portfolio_value = account.portfolio_value;

    let mut pending_buys: BTreeMap<String, f64> = BTreeMap::new();
    let mut pending_sells: BTreeMap<String, f64> = BTreeMap::new();
    for order in pending_orders {
        let bucket = match order.side {
            OrderSide::Buy => &mut pending_buys,
            OrderSide::Sell => &mut pending_sells,
        };
        *bucket.entry(order.symbol.clone()).or_insert(0.0) += order.qty;
    }

    let held: BTreeSet<String> = positions.iter().map(|p| p.symbol.clone()).collect();

    let mut actions: Vec<AllocationAction> = Vec::new();
    let mut total_sell_proceeds = 0.0;
    let mut total_buy_allocation = 0.0;
    let safe_reserve = RESERVE_FLOOR.max(buying_power * RESERVE_FRACTION);

    // --- Sell phase: strong sell signals liquidate a conviction-sized
    // fraction of the position, never the whole of it.
    for position in positions {
        let Some(signal) = signals.portfolio_signals.get(&position.symbol) else {
            continue;
        };
        if signal.action != SignalAction::Sell || signal.strength < SELL_STRENGTH_THRESHOLD {
            continue;
        }
        if let Some(qty) = pending_sells.get(&position.symbol) {
            info!(
                "Skipping sell for {} - pending sell order exists ({} shares)",
                position.symbol, qty
            );
            continue;
        }
        if position.qty <= 0.0 {
            continue;
        }

        // Proportional partial sell, floored but never to zero; capped at
        // the whole-share inventory so a position can never go negative.
        let sell_qty = ((position.qty * signal.strength).floor() as i64)
            .max(1)
            .min(position.qty.floor() as i64);
        if sell_qty <= 0 {
            continue;
        }
        let proceeds = sell_qty as f64 * position.current_price;

        let reasoning = if signal.reasoning.is_empty() {
            "Partial sell - strong downside signal".to_string()
        } else {
            signal.reasoning.clone()
        };
        actions.push(AllocationAction {
            symbol: position.symbol.clone(),
            side: OrderSide::Sell,
            quantity: sell_qty,
            price_allocation: proceeds,
            strength: signal.strength,
            reasoning,
            category: SignalCategory::PortfolioIncrease,
        });
        total_sell_proceeds += proceeds;
    }

    // --- Safe buy budget.
    let available_for_buys = (cash_available + total_sell_proceeds - safe_reserve)
        .clamp(0.0, (buying_power - safe_reserve).max(0.0));
    let max_per_position = portfolio_value * MAX_POSITION_FRACTION;
    let budget_allocation =
        (available_for_buys * DEPLOY_FRACTION).min(buying_power * POWER_CAP_FRACTION);

    // --- Buy phase: proportional weighted allocation over the prioritized
    // candidate list.
    let candidates = normalizer::buy_candidates(signals, &held, &pending_buys);
    let mut remaining_buying_power = buying_power - safe_reserve;

    if !candidates.is_empty() && budget_allocation > 0.0 {
        let total_strength: f64 = candidates.iter().map(|c| c.strength.max(MIN_WEIGHT)).sum();

        for candidate in &candidates {
            let weight = candidate.strength.max(MIN_WEIGHT);
            let mut allocation = (weight / total_strength) * budget_allocation;
            allocation = allocation.min(max_per_position);
            // Never overshoot what is left of the budget.
            allocation = allocation.min((budget_allocation - total_buy_allocation).max(0.0));

            if allocation > remaining_buying_power {
                info!(
                    "Skipping {}: allocation ${:.2} exceeds remaining buying power ${:.2}",
                    candidate.symbol, allocation, remaining_buying_power
                );
                continue;
            }
            if allocation < MIN_TRADE_DOLLARS {
                continue;
            }

            let current_price = match price_feed.daily_prices(&candidate.symbol).await {
                Ok(bars) => match bars.first() {
                    Some(bar) if bar.close > 0.0 => bar.close,
                    _ => {
                        warn!(
                            "No usable price for {}; skipping candidate",
                            candidate.symbol
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        "Price lookup failed for {} ({}); skipping candidate",
                        candidate.symbol, e
                    );
                    continue;
                }
            };

            let quantity = (allocation / current_price).floor() as i64;
            if quantity > 0 {
                actions.push(AllocationAction {
                    symbol: candidate.symbol.clone(),
                    side: OrderSide::Buy,
                    quantity,
                    price_allocation: allocation,
                    strength: weight,
                    reasoning: candidate.reasoning.clone(),
                    category: candidate.category,
                });
                total_buy_allocation += allocation;
                remaining_buying_power -= allocation;
            }
        }
    }

    // --- Finalization.
    let mut total_allocation = total_sell_proceeds + total_buy_allocation;
    let mut final_cash = cash_available + total_sell_proceeds - total_buy_allocation;
    if final_cash < 0.0 {
        // Unreachable given the budget clamp; if this fires the planner has
        // a logic defect.
        error!(
            "Planner produced negative projected cash ({:.2}); clamping to 0",
            final_cash
        );
        final_cash = 0.0;
        total_allocation = cash_available + total_sell_proceeds;
    }

    let buy_count = actions.iter().filter(|a| a.side == OrderSide::Buy).count();
    let sell_count = actions.iter().filter(|a| a.side == OrderSide::Sell).count();
    let reasoning = format!(
        "Smart allocation: {} positions to buy, {} partial sells. Allocated ${:.2} from ${:.2} budget. ${:.2} cash remains (never negative). Avoided double-buying {} symbols with pending orders.",
        buy_count,
        sell_count,
        total_buy_allocation,
        budget_allocation,
        final_cash,
        pending_buys.len()
    );

    AllocationPlan {
        num_actions: actions.len(),
        actions,
        cash_available,
        cash_remaining: final_cash,
        total_allocation,
        portfolio_value,
        buy_count,
        sell_count,
        pending_buys,
        pending_sells,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::models::{DailyBar, TradeSignal};
    use common::traits::MockPriceFeed;

    fn account(cash: f64, buying_power: f64, portfolio_value: f64) -> AccountSnapshot {
        AccountSnapshot {
            cash,
            buying_power,
            portfolio_value,
            equity: portfolio_value,
        }
    }

    fn position(symbol: &str, qty: f64, price: f64) -> Position {
        Position {
            symbol: symbol.to_string(),
            qty,
            avg_entry_price: price,
            current_price: price,
            market_value: qty * price,
            unrealized_pl: 0.0,
        }
    }

    fn portfolio_sell(symbol: &str, strength: f64) -> SignalSet {
        SignalSet {
            portfolio_signals: [(
                symbol.to_string(),
                TradeSignal::new(SignalAction::Sell, strength, "downside risk"),
            )]
            .into(),
            ..Default::default()
        }
    }

    fn news_buy(symbol: &str, strength: f64) -> SignalSet {
        SignalSet {
            news_opportunities: [(
                symbol.to_string(),
                TradeSignal::new(SignalAction::Buy, strength, "good news"),
            )]
            .into(),
            ..Default::default()
        }
    }

    fn feed_at(price: f64) -> MockPriceFeed {
        let mut feed = MockPriceFeed::new();
        feed.expect_daily_prices().returning(move |_| {
            Ok(vec![DailyBar {
                date: NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
                close: price,
            }])
        });
        feed
    }

    #[tokio::test]
    async fn worked_scenario_single_candidate() {
        // cash/bp/pv = 10_000 -> reserve 2500, available 7500,
        // budget min(4500, 4000) = 4000, capped per-position to 800.
        let feed = feed_at(50.0);
        let plan = build_plan(
            &account(10_000.0, 10_000.0, 10_000.0),
            &[],
            &[],
            &news_buy("AAPL", 0.9),
            &feed,
        )
        .await;

        assert_eq!(plan.buy_count, 1);
        let buy = plan.buys().next().unwrap();
        assert!((buy.price_allocation - 800.0).abs() < 1e-9);
        assert_eq!(buy.quantity, 16);
        assert!((plan.total_allocation - 800.0).abs() < 1e-9);
        assert!((plan.cash_remaining - 9_200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn budget_splits_proportional_to_floored_weights() {
        // Large portfolio so the per-position cap does not bind:
        // weights 0.9 and max(0.5, 0.3) of total 1.4.
        let mut signals = news_buy("STRONG", 0.9);
        signals.news_opportunities.insert(
            "WEAKER".to_string(),
            TradeSignal::new(SignalAction::Buy, 0.3, "thin signal"),
        );
        let feed = feed_at(10.0);
        let plan = build_plan(
            &account(10_000.0, 10_000.0, 100_000.0),
            &[],
            &[],
            &signals,
            &feed,
        )
        .await;

        assert_eq!(plan.buy_count, 2);
        let strong = plan.buys().find(|a| a.symbol == "STRONG").unwrap();
        let weaker = plan.buys().find(|a| a.symbol == "WEAKER").unwrap();
        let budget = 4_000.0;
        assert!((strong.price_allocation - 0.9 / 1.4 * budget).abs() < 1e-6);
        assert!((weaker.price_allocation - 0.5 / 1.4 * budget).abs() < 1e-6);
        assert_eq!(weaker.strength, 0.5);
    }

    #[tokio::test]
    async fn allocations_below_the_dust_floor_are_skipped() {
        // available = 1066.67 - 1000 = 66.67; budget = 40 < $50 floor.
        let feed = feed_at(10.0);
        let plan = build_plan(
            &account(1_066.6666667, 4_000.0, 10_000.0),
            &[],
            &[],
            &news_buy("TINY", 1.0),
            &feed,
        )
        .await;

        assert_eq!(plan.buy_count, 0);
        assert_eq!(plan.cash_remaining, plan.cash_available);
    }

    #[tokio::test]
    async fn strong_sell_liquidates_proportional_quantity() {
        let feed = MockPriceFeed::new();
        let plan = build_plan(
            &account(5_000.0, 5_000.0, 10_000.0),
            &[position("XOM", 100.0, 10.0)],
            &[],
            &portfolio_sell("XOM", 1.0),
            &feed,
        )
        .await;

        assert_eq!(plan.sell_count, 1);
        let sell = plan.sells().next().unwrap();
        assert_eq!(sell.quantity, 100);
        assert!((sell.price_allocation - 1_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sell_strength_point_seven_takes_seventy_percent() {
        let feed = MockPriceFeed::new();
        let plan = build_plan(
            &account(5_000.0, 5_000.0, 10_000.0),
            &[position("XOM", 100.0, 10.0)],
            &[],
            &portfolio_sell("XOM", 0.7),
            &feed,
        )
        .await;

        assert_eq!(plan.sells().next().unwrap().quantity, 70);
    }

    #[tokio::test]
    async fn weak_sell_signal_is_ignored() {
        let feed = MockPriceFeed::new();
        let plan = build_plan(
            &account(5_000.0, 5_000.0, 10_000.0),
            &[position("XOM", 100.0, 10.0)],
            &[],
            &portfolio_sell("XOM", 0.5),
            &feed,
        )
        .await;

        assert_eq!(plan.sell_count, 0);
        assert!(plan.actions.is_empty());
    }

    #[tokio::test]
    async fn pending_orders_block_same_side_actions() {
        let mut signals = portfolio_sell("XOM", 0.9);
        signals.news_opportunities.insert(
            "NVDA".to_string(),
            TradeSignal::new(SignalAction::Buy, 0.9, ""),
        );
        let pending = vec![
            PendingOrder {
                id: "o1".to_string(),
                symbol: "XOM".to_string(),
                side: OrderSide::Sell,
                qty: 10.0,
                status: "new".to_string(),
            },
            PendingOrder {
                id: "o2".to_string(),
                symbol: "NVDA".to_string(),
                side: OrderSide::Buy,
                qty: 5.0,
                status: "accepted".to_string(),
            },
        ];
        let feed = feed_at(10.0);
        let plan = build_plan(
            &account(10_000.0, 10_000.0, 10_000.0),
            &[position("XOM", 100.0, 10.0)],
            &pending,
            &signals,
            &feed,
        )
        .await;

        assert!(plan.actions.is_empty());
        assert_eq!(plan.pending_sells.get("XOM"), Some(&10.0));
        assert_eq!(plan.pending_buys.get("NVDA"), Some(&5.0));
    }

    #[tokio::test]
    async fn failed_price_lookup_skips_the_candidate() {
        let mut feed = MockPriceFeed::new();
        feed.expect_daily_prices()
            .returning(|_| Err(common::error::DataError::Empty("AAPL".to_string())));
        let plan = build_plan(
            &account(10_000.0, 10_000.0, 10_000.0),
            &[],
            &[],
            &news_buy("AAPL", 0.9),
            &feed,
        )
        .await;

        assert_eq!(plan.buy_count, 0);
        assert_eq!(plan.cash_remaining, plan.cash_available);
    }

    #[tokio::test]
    async fn empty_price_history_skips_the_candidate() {
        let mut feed = MockPriceFeed::new();
        feed.expect_daily_prices().returning(|_| Ok(Vec::new()));
        let plan = build_plan(
            &account(10_000.0, 10_000.0, 10_000.0),
            &[],
            &[],
            &news_buy("AAPL", 0.9),
            &feed,
        )
        .await;

        assert_eq!(plan.buy_count, 0);
    }

    #[tokio::test]
    async fn buy_budget_never_exceeds_caps() {
        let mut signals = SignalSet::default();
        for (i, strength) in [0.9, 0.85, 0.8, 0.75, 0.7, 0.65].iter().enumerate() {
            signals.news_opportunities.insert(
                format!("SYM{}", i),
                TradeSignal::new(SignalAction::Buy, *strength, ""),
            );
        }
        let feed = feed_at(25.0);
        let acct = account(50_000.0, 50_000.0, 20_000.0);
        let plan = build_plan(&acct, &[], &[], &signals, &feed).await;

        let total_buys: f64 = plan.buys().map(|a| a.price_allocation).sum();
        assert!(total_buys <= acct.buying_power * POWER_CAP_FRACTION + 1e-9);
        for buy in plan.buys() {
            assert!(buy.price_allocation <= acct.portfolio_value * MAX_POSITION_FRACTION + 1e-9);
        }
        assert!(plan.cash_remaining >= 0.0);
    }

    #[tokio::test]
    async fn identical_inputs_produce_byte_identical_plans() {
        let mut signals = news_buy("AAPL", 0.9);
        signals.new_buy_candidates.insert(
            "ZZZT".to_string(),
            TradeSignal::new(SignalAction::Buy, 0.7, "fresh"),
        );
        signals.portfolio_signals.insert(
            "XOM".to_string(),
            TradeSignal::new(SignalAction::Sell, 0.8, "fading"),
        );
        let acct = account(25_000.0, 25_000.0, 25_000.0);
        let positions = vec![position("XOM", 40.0, 110.0)];

        let feed = feed_at(50.0);
        let first = build_plan(&acct, &positions, &[], &signals, &feed).await;
        let second = build_plan(&acct, &positions, &[], &signals, &feed).await;

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn sell_proceeds_feed_the_buy_budget() {
        // Without proceeds: cash 2000 - reserve 1250 = 750 available.
        // With 1000 proceeds: 1750 available, budget = min(1050, 2000).
        let mut signals = portfolio_sell("XOM", 1.0);
        signals.news_opportunities.insert(
            "AAPL".to_string(),
            TradeSignal::new(SignalAction::Buy, 1.0, ""),
        );
        let feed = feed_at(10.0);
        let plan = build_plan(
            &account(2_000.0, 5_000.0, 20_000.0),
            &[position("XOM", 100.0, 10.0)],
            &[],
            &signals,
            &feed,
        )
        .await;

        assert_eq!(plan.sell_count, 1);
        assert_eq!(plan.buy_count, 1);
        let buy = plan.buys().next().unwrap();
        assert!((buy.price_allocation - 1_050.0).abs() < 1e-9);
        let expected_total = 1_000.0 + 1_050.0;
        assert!((plan.total_allocation - expected_total).abs() < 1e-9);
        assert!((plan.cash_remaining - (2_000.0 + 1_000.0 - 1_050.0)).abs() < 1e-9);
    }
}
