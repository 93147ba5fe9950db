use common::models::{SignalAction, SignalCategory, SignalSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Conviction bar for symbols that appear only in the speculative
/// new-candidate bucket.
pub const NEW_CANDIDATE_MIN_STRENGTH: f64 = 0.6;

/// A buy under consideration, ready for the planner's greedy budget walk.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyCandidate {
    pub symbol: String,
    pub strength: f64,
    /// 3 = strengthen holding, 2 = news opportunity, 1 = new candidate.
    pub priority: u8,
    pub reasoning: String,
    pub category: SignalCategory,
}

/// Merges the three categorized signal sources into one prioritized buy
/// list, deduplicated against in-flight buy orders.
///
/// The returned ordering is load-bearing: the planner funds candidates
/// front to back, so higher-tier, higher-conviction symbols win when the
/// budget runs short. Ties break on symbol so identical inputs always
/// produce the identical list.
pub fn buy_candidates(
    signals: &SignalSet,
    held: &BTreeSet<String>,
    pending_buys: &BTreeMap<String, f64>,
) -> Vec<BuyCandidate> {
    let mut candidates = Vec::new();

    let mut push = |symbol: &str, strength: f64, priority: u8, reasoning: &str, fallback: &str, category: SignalCategory| {
        if let Some(qty) = pending_buys.get(symbol) {
            info!(
                "Skipping buy candidate {} - pending buy order exists ({} shares)",
                symbol, qty
            );
            return;
        }
        let reasoning = if reasoning.is_empty() { fallback } else { reasoning };
        candidates.push(BuyCandidate {
            symbol: symbol.to_string(),
            strength,
            priority,
            reasoning: reasoning.to_string(),
            category,
        });
    };

    // Tier 3: strengthen what we already hold.
    for (symbol, signal) in &signals.portfolio_signals {
        if signal.action == SignalAction::Buy && held.contains(symbol) {
            push(
                symbol,
                signal.strength,
                3,
                &signal.reasoning,
                "Strengthen existing position",
                SignalCategory::PortfolioIncrease,
            );
        }
    }

    // Tier 2: news-driven entries into symbols we do not hold.
    for (symbol, signal) in &signals.news_opportunities {
        if signal.action == SignalAction::Buy && !held.contains(symbol) {
            push(
                symbol,
                signal.strength,
                2,
                &signal.reasoning,
                "News-driven opportunity",
                SignalCategory::NewsOpportunity,
            );
        }
    }

    // Tier 1: speculative candidates, stricter conviction bar.
    for (symbol, signal) in &signals.new_buy_candidates {
        if signal.action == SignalAction::Buy
            && !held.contains(symbol)
            && !signals.news_opportunities.contains_key(symbol)
            && signal.strength >= NEW_CANDIDATE_MIN_STRENGTH
        {
            push(
                symbol,
                signal.strength,
                1,
                &signal.reasoning,
                "Emerging candidate",
                SignalCategory::NewCandidate,
            );
        }
    }

    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.strength.total_cmp(&a.strength))
            .then(a.symbol.cmp(&b.symbol))
    });

    candidates
}
