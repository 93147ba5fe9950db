use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use common::error::DataError;
use common::models::{
    DailyBar, Position, PricePrediction, Sentiment, SignalCategory, SignalContext, SignalSet,
};
use common::traits::{NewsFeed, PriceFeed, SignalModel};

/// Most recent closes included in a symbol's model context.
const PRICE_HISTORY_BARS: usize = 30;

/// A headline after sentiment scoring.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub description: String,
    pub sentiment: Sentiment,
}

fn format_price_history(bars: &[DailyBar]) -> String {
    bars.iter()
        .take(PRICE_HISTORY_BARS)
        .map(|b| format!("{}: {:.2}", b.date, b.close))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turns trending news plus current holdings into the categorized signal
/// set, through one batched model call per stage. Every upstream failure
/// degrades in place; `collect` never errors into the planner.
pub struct SignalService<N, P, M> {
    news: N,
    prices: P,
    model: M,
}

impl<N: NewsFeed, P: PriceFeed, M: SignalModel> SignalService<N, P, M> {
    pub fn new(news: N, prices: P, model: M) -> Self {
        Self {
            news,
            prices,
            model,
        }
    }

    /// Fetches trending headlines and scores each through the sentiment
    /// batch. Titles the model skipped get a flagged neutral.
    pub async fn score_news(&self) -> Result<BTreeMap<String, ScoredArticle>, DataError> {
        let articles = self.news.trending_news().await?;

        let article_map: BTreeMap<String, String> = articles
            .into_iter()
            .map(|a| (a.title, a.description))
            .collect();

        let mut sentiments = self.model.analyze_sentiment_batch(&article_map).await?;

        Ok(article_map
            .into_iter()
            .map(|(title, description)| {
                let sentiment = sentiments
                    .remove(&title)
                    .unwrap_or_else(|| Sentiment::degraded_neutral("Missing in response"));
                (
                    title,
                    ScoredArticle {
                        description,
                        sentiment,
                    },
                )
            })
            .collect())
    }

    /// Merges the scored headlines into one context, asks the model for
    /// per-ticker price predictions, and keeps only tickers the price feed
    /// recognizes.
    pub async fn analyze_news(
        &self,
        scored: &BTreeMap<String, ScoredArticle>,
    ) -> BTreeMap<String, PricePrediction> {
        if scored.is_empty() {
            return BTreeMap::new();
        }

        let merged_context = scored
            .iter()
            .map(|(title, data)| format!("Title: {title}\nDescription: {}", data.description))
            .collect::<Vec<_>>()
            .join("\n\n");

        let predictions = match self.model.predict_price_movement(&merged_context).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Price prediction failed: {}", e);
                return BTreeMap::new();
            }
        };

        let mut valid = BTreeMap::new();
        for (ticker, prediction) in predictions {
            match self.prices.latest_quote(&ticker).await {
                Ok(Some(_)) => {
                    valid.insert(ticker, prediction);
                }
                Ok(None) => {
                    debug!("Dropping predicted ticker {}: unknown to price feed", ticker);
                }
                Err(e) => {
                    warn!("Dropping predicted ticker {}: quote lookup failed ({})", ticker, e);
                }
            }
        }
        valid
    }

    /// The full per-cycle signal collection: news, sentiment, predictions,
    /// then one batched trading-signal call over held symbols plus
    /// validated news tickers.
    pub async fn collect(&self, positions: &[Position]) -> SignalSet {
        let scored = match self.score_news().await {
            Ok(scored) => scored,
            Err(e) => {
                warn!("News scoring failed, continuing without news: {}", e);
                BTreeMap::new()
            }
        };

        let predictions = self.analyze_news(&scored).await;

        let held: BTreeSet<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let mut symbols: BTreeSet<String> = held.clone();
        symbols.extend(predictions.keys().cloned());

        let mut contexts = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let category = if held.contains(symbol) {
                SignalCategory::PortfolioIncrease
            } else if predictions.contains_key(symbol) {
                SignalCategory::NewsOpportunity
            } else {
                SignalCategory::NewCandidate
            };

            let price_history = match self.prices.daily_prices(symbol).await {
                Ok(bars) if !bars.is_empty() => format_price_history(&bars),
                Ok(_) => "Price history unavailable.".to_string(),
                Err(e) => {
                    warn!("Price history failed for {}: {}", symbol, e);
                    "Price history unavailable.".to_string()
                }
            };

            let news = predictions
                .get(symbol)
                .map(|p| p.reasoning.clone())
                .unwrap_or_default();

            contexts.push(SignalContext {
                symbol: symbol.clone(),
                category,
                price_history,
                news,
            });
        }

        if contexts.is_empty() {
            info!("No symbols to analyze this cycle");
            return SignalSet::default();
        }

        match self.model.analyze_trading_signal(&contexts).await {
            Ok(set) => set,
            Err(e) => {
                warn!("Trading-signal analysis failed: {}", e);
                SignalSet::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{Article, SentimentLabel, SignalAction, TradeSignal};
    use common::traits::{MockNewsFeed, MockPriceFeed, MockSignalModel};
    use chrono::NaiveDate;

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            qty: 10.0,
            avg_entry_price: 100.0,
            current_price: 100.0,
            market_value: 1_000.0,
            unrealized_pl: 0.0,
        }
    }

    fn prediction(reasoning: &str) -> PricePrediction {
        PricePrediction {
            action: SignalAction::Buy,
            confidence: 0.8,
            reasoning: reasoning.to_string(),
            name: String::new(),
        }
    }

    fn bar(close: f64) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
            close,
        }
    }

    #[tokio::test]
    async fn titles_missing_from_sentiment_response_get_degraded_neutral() {
        let mut news = MockNewsFeed::new();
        news.expect_trending_news().returning(|| {
            Ok(vec![
                Article {
                    title: "Covered".to_string(),
                    description: "a".to_string(),
                },
                Article {
                    title: "Skipped".to_string(),
                    description: "b".to_string(),
                },
            ])
        });
        let mut model = MockSignalModel::new();
        model.expect_analyze_sentiment_batch().returning(|_| {
            Ok([(
                "Covered".to_string(),
                Sentiment {
                    sentiment: SentimentLabel::Positive,
                    score: 0.9,
                    reasoning: "upbeat".to_string(),
                    degraded: false,
                },
            )]
            .into())
        });

        let service = SignalService::new(news, MockPriceFeed::new(), model);
        let scored = service.score_news().await.unwrap();

        assert!(!scored["Covered"].sentiment.degraded);
        assert!(scored["Skipped"].sentiment.degraded);
        assert_eq!(scored["Skipped"].sentiment.sentiment, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn unvalidated_tickers_are_dropped_from_predictions() {
        let mut model = MockSignalModel::new();
        model.expect_predict_price_movement().returning(|_| {
            Ok([
                ("REAL".to_string(), prediction("solid")),
                ("FAKE".to_string(), prediction("hallucinated")),
            ]
            .into())
        });
        let mut prices = MockPriceFeed::new();
        prices
            .expect_latest_quote()
            .returning(|symbol| Ok((symbol == "REAL").then_some(123.0)));

        let service = SignalService::new(MockNewsFeed::new(), prices, model);
        let scored: BTreeMap<String, ScoredArticle> = [(
            "T".to_string(),
            ScoredArticle {
                description: "d".to_string(),
                sentiment: Sentiment::degraded_neutral("x"),
            },
        )]
        .into();
        let valid = service.analyze_news(&scored).await;

        assert_eq!(valid.len(), 1);
        assert!(valid.contains_key("REAL"));
    }

    #[tokio::test]
    async fn collect_categorizes_held_and_news_symbols() {
        let mut news = MockNewsFeed::new();
        news.expect_trending_news().returning(|| {
            Ok(vec![Article {
                title: "Chip demand surges".to_string(),
                description: "Data centers".to_string(),
            }])
        });
        let mut model = MockSignalModel::new();
        model
            .expect_analyze_sentiment_batch()
            .returning(|_| Ok(BTreeMap::new()));
        model
            .expect_predict_price_movement()
            .returning(|_| Ok([("NVDA".to_string(), prediction("chips"))].into()));
        model
            .expect_analyze_trading_signal()
            .withf(|contexts| {
                contexts.len() == 2
                    && contexts[0].symbol == "AAPL"
                    && contexts[0].category == SignalCategory::PortfolioIncrease
                    && contexts[1].symbol == "NVDA"
                    && contexts[1].category == SignalCategory::NewsOpportunity
                    && contexts[1].news == "chips"
            })
            .returning(|_| {
                Ok(SignalSet {
                    news_opportunities: [(
                        "NVDA".to_string(),
                        TradeSignal::new(SignalAction::Buy, 0.8, "chips"),
                    )]
                    .into(),
                    ..Default::default()
                })
            });
        let mut prices = MockPriceFeed::new();
        prices.expect_latest_quote().returning(|_| Ok(Some(100.0)));
        prices
            .expect_daily_prices()
            .returning(|_| Ok(vec![bar(100.0)]));

        let service = SignalService::new(news, prices, model);
        let set = service.collect(&[position("AAPL")]).await;

        assert_eq!(set.news_opportunities.len(), 1);
    }

    #[tokio::test]
    async fn news_failure_with_no_holdings_yields_empty_set() {
        let mut news = MockNewsFeed::new();
        news.expect_trending_news()
            .returning(|| Err(DataError::Transport("connection refused".to_string())));

        let service = SignalService::new(news, MockPriceFeed::new(), MockSignalModel::new());
        let set = service.collect(&[]).await;

        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn failed_price_history_becomes_placeholder_text() {
        let mut news = MockNewsFeed::new();
        news.expect_trending_news().returning(|| Ok(Vec::new()));
        let mut model = MockSignalModel::new();
        model
            .expect_analyze_sentiment_batch()
            .returning(|_| Ok(BTreeMap::new()));
        model
            .expect_analyze_trading_signal()
            .withf(|contexts| {
                contexts.len() == 1 && contexts[0].price_history == "Price history unavailable."
            })
            .returning(|_| Ok(SignalSet::default()));
        let mut prices = MockPriceFeed::new();
        prices
            .expect_daily_prices()
            .returning(|_| Err(DataError::Empty("AAPL".to_string())));

        let service = SignalService::new(news, prices, model);
        service.collect(&[position("AAPL")]).await;
    }

    #[test]
    fn price_history_is_truncated_and_formatted() {
        let bars: Vec<DailyBar> = (0..40)
            .map(|i| DailyBar {
                date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap() + chrono::Days::new(i),
                close: 100.0 + i as f64,
            })
            .collect();
        let text = format_price_history(&bars);

        assert_eq!(text.matches("; ").count(), PRICE_HISTORY_BARS - 1);
        assert!(text.starts_with("2026-07-01: 100.00"));
    }
}
