use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::signal::{SignalAction, SignalCategory};

/// A trending headline as delivered by the news provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    #[serde(other)]
    Neutral,
}

/// Per-article sentiment from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub sentiment: SentimentLabel,
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub degraded: bool,
}

impl Sentiment {
    pub fn degraded_neutral(reasoning: impl Into<String>) -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: 0.5,
            reasoning: reasoning.into(),
            degraded: true,
        }
    }
}

/// Model-predicted price direction for one ticker, derived from the merged
/// news context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub action: SignalAction,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub name: String,
}

/// One daily close. Price feeds return these most-recent-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
}

/// Consolidated per-symbol input for the batched trading-signal call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub symbol: String,
    pub category: SignalCategory,
    pub price_history: String,
    pub news: String,
}
