use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

use common::error::DataError;
use common::models::{
    PricePrediction, Sentiment, SignalCategory, SignalContext, SignalSet, TradeSignal,
};
use common::traits::SignalModel;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-2.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// The model is told "no markdown" but fences the JSON anyway often enough
/// that stripping them must be routine.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_sentiments(text: &str) -> Option<BTreeMap<String, Sentiment>> {
    serde_json::from_str(strip_fences(text)).ok()
}

fn parse_predictions(text: &str) -> Option<BTreeMap<String, PricePrediction>> {
    serde_json::from_str(strip_fences(text)).ok()
}

fn parse_signal_set(text: &str) -> Option<SignalSet> {
    serde_json::from_str(strip_fences(text)).ok()
}

/// The fallback when the signal response is unusable: every requested symbol
/// holds at neutral strength, flagged so downstream can tell it apart from a
/// genuine hold.
fn degraded_signal_set(inputs: &[SignalContext]) -> SignalSet {
    let mut set = SignalSet::default();
    for input in inputs {
        let bucket = match input.category {
            SignalCategory::PortfolioIncrease => &mut set.portfolio_signals,
            SignalCategory::NewsOpportunity => &mut set.news_opportunities,
            SignalCategory::NewCandidate => &mut set.new_buy_candidates,
        };
        bucket.insert(
            input.symbol.clone(),
            TradeSignal::degraded_neutral("Could not parse signal"),
        );
    }
    set
}

/// Gemini `generateContent` querier for sentiment, price-direction and
/// trading-signal analysis.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DataError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, DataError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, MODEL, self.api_key
        );
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DataError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("Gemini generateContent failed ({}): {}", status, message);
            return Err(DataError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = resp
            .json::<GenerateResponse>()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| DataError::Empty("model response".to_string()))
    }
}

#[async_trait]
impl SignalModel for GeminiClient {
    async fn analyze_sentiment_batch(
        &self,
        articles: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Sentiment>, DataError> {
        let mut listing = String::new();
        for (title, description) in articles {
            let _ = writeln!(listing, "Title: {title}\nDescription: {description}\n");
        }
        let prompt = format!(
            "Analyze the sentiment of the following stock/trading news articles.\n\
             Return a JSON object keyed by the exact article title. Each value must have:\n\
             - sentiment: \"positive\", \"negative\", or \"neutral\"\n\
             - score: confidence score from 0.0 to 1.0\n\
             - reasoning: brief explanation\n\n\
             Articles:\n{listing}\n\
             Return only valid JSON, no markdown."
        );

        let text = self.generate(&prompt).await?;
        match parse_sentiments(&text) {
            Some(sentiments) => Ok(sentiments),
            None => {
                warn!("Unparseable sentiment response; falling back to neutral");
                Ok(articles
                    .keys()
                    .map(|title| {
                        (
                            title.clone(),
                            Sentiment::degraded_neutral("Could not parse sentiment"),
                        )
                    })
                    .collect())
            }
        }
    }

    async fn predict_price_movement(
        &self,
        context: &str,
    ) -> Result<BTreeMap<String, PricePrediction>, DataError> {
        let prompt = format!(
            "Based on the following financial news, identify the US stock tickers most likely \
             to move and predict the direction for each.\n\
             Return a JSON object keyed by ticker symbol. Each value must have:\n\
             - action: \"buy\", \"sell\", or \"hold\"\n\
             - confidence: confidence score from 0.0 to 1.0\n\
             - reasoning: brief explanation of your prediction\n\
             - name: the company name\n\n\
             Context:\n{context}\n\n\
             Return only valid JSON, no markdown."
        );

        let text = self.generate(&prompt).await?;
        match parse_predictions(&text) {
            Some(predictions) => Ok(predictions),
            None => {
                warn!("Unparseable prediction response; treating as no opportunities");
                Ok(BTreeMap::new())
            }
        }
    }

    async fn analyze_trading_signal(
        &self,
        inputs: &[SignalContext],
    ) -> Result<SignalSet, DataError> {
        let mut listing = String::new();
        for input in inputs {
            let _ = writeln!(
                listing,
                "Symbol: {}\nCategory: {}\nPrice History: {}\nRecent News: {}\n",
                input.symbol, input.category, input.price_history, input.news
            );
        }
        let prompt = format!(
            "Analyze the trading signal for each of the following symbols.\n\
             Return a JSON object with three keys: \"portfolio_signals\", \
             \"news_opportunities\" and \"new_buy_candidates\". Place each symbol under the \
             key matching its listed category, mapped to a value with:\n\
             - action: \"buy\", \"sell\", or \"hold\"\n\
             - strength: signal strength from 0.0 to 1.0\n\
             - reasoning: detailed explanation of the signal\n\n\
             Symbols:\n{listing}\n\
             Return only valid JSON, no markdown."
        );

        let text = self.generate(&prompt).await?;
        match parse_signal_set(&text) {
            Some(set) => Ok(set),
            None => {
                warn!("Unparseable signal response; falling back to neutral holds");
                Ok(degraded_signal_set(inputs))
            }
        }
    }
}
