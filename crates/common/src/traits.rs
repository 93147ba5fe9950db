use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::{BrokerError, DataError};
use crate::models::{
    AccountSnapshot, Article, DailyBar, OrderReceipt, PendingOrder, Position, PricePrediction,
    Sentiment, SignalContext, SignalSet,
};

/// The brokerage, as far as the engine is concerned. Constructed once at
/// process start and passed in explicitly; never looked up ambiently.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Open (unresolved) orders only.
    async fn get_pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError>;

    async fn market_buy(&self, symbol: &str, qty: i64) -> Result<OrderReceipt, BrokerError>;

    async fn market_sell(&self, symbol: &str, qty: i64) -> Result<OrderReceipt, BrokerError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Daily bars, most recent first. May be empty.
    async fn daily_prices(&self, symbol: &str) -> Result<Vec<DailyBar>, DataError>;

    /// Latest traded price, `None` when the symbol is unknown to the feed.
    async fn latest_quote(&self, symbol: &str) -> Result<Option<f64>, DataError>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn trending_news(&self) -> Result<Vec<Article>, DataError>;
}

/// The language-model querier. Implementations must parse defensively:
/// malformed output degrades to neutral defaults (flagged `degraded`), it
/// never errors into the planner.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait SignalModel: Send + Sync {
    async fn analyze_sentiment_batch(
        &self,
        articles: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Sentiment>, DataError>;

    async fn predict_price_movement(
        &self,
        context: &str,
    ) -> Result<BTreeMap<String, PricePrediction>, DataError>;

    async fn analyze_trading_signal(
        &self,
        inputs: &[SignalContext],
    ) -> Result<SignalSet, DataError>;
}
