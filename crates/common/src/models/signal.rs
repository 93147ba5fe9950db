use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    #[serde(alias = "strong_buy")]
    Buy,
    Sell,
    #[serde(other)]
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "buy"),
            SignalAction::Sell => write!(f, "sell"),
            SignalAction::Hold => write!(f, "hold"),
        }
    }
}

/// A single model-derived recommendation for one symbol. Ephemeral: produced
/// fresh each cycle and never persisted as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: SignalAction,
    /// Conviction in [0, 1]; clamped at the parsing boundary.
    pub strength: f64,
    pub reasoning: String,
    /// True when this signal is a fallback produced because the model
    /// response was missing or unparseable, as opposed to a genuine neutral
    /// answer from the model.
    #[serde(default)]
    pub degraded: bool,
}

impl TradeSignal {
    pub fn new(action: SignalAction, strength: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            strength: strength.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            degraded: false,
        }
    }

    /// The neutral fallback emitted when model output is missing or garbled.
    pub fn degraded_neutral(reasoning: impl Into<String>) -> Self {
        Self {
            action: SignalAction::Hold,
            strength: 0.5,
            reasoning: reasoning.into(),
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    PortfolioIncrease,
    NewsOpportunity,
    NewCandidate,
}

impl SignalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::PortfolioIncrease => "portfolio_increase",
            SignalCategory::NewsOpportunity => "news_opportunity",
            SignalCategory::NewCandidate => "new_candidate",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three categorized signal sources produced by one batched model call.
/// Ordered maps: planning iterates these and must stay deterministic for
/// identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    #[serde(default)]
    pub portfolio_signals: BTreeMap<String, TradeSignal>,
    #[serde(default)]
    pub news_opportunities: BTreeMap<String, TradeSignal>,
    #[serde(default)]
    pub new_buy_candidates: BTreeMap<String, TradeSignal>,
}

impl SignalSet {
    pub fn is_empty(&self) -> bool {
        self.portfolio_signals.is_empty()
            && self.news_opportunities.is_empty()
            && self.new_buy_candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_buy_parses_as_buy() {
        let sig: TradeSignal = serde_json::from_str(
            r#"{"action":"strong_buy","strength":0.8,"reasoning":"momentum"}"#,
        )
        .unwrap();
        assert_eq!(sig.action, SignalAction::Buy);
        assert!(!sig.degraded);
    }

    #[test]
    fn unknown_action_parses_as_hold() {
        let sig: TradeSignal =
            serde_json::from_str(r#"{"action":"moon","strength":0.9,"reasoning":""}"#).unwrap();
        assert_eq!(sig.action, SignalAction::Hold);
    }

    #[test]
    fn strength_is_clamped() {
        let sig = TradeSignal::new(SignalAction::Buy, 1.7, "x");
        assert_eq!(sig.strength, 1.0);
        let sig = TradeSignal::new(SignalAction::Sell, -0.2, "x");
        assert_eq!(sig.strength, 0.0);
    }
}
