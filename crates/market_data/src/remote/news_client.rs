use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use common::error::DataError;
use common::models::Article;
use common::traits::NewsFeed;

const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";
const PAGE_SIZE: u32 = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ArticleDto {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadlinesDto {
    #[serde(default)]
    articles: Vec<ArticleDto>,
}

/// NewsAPI top-headlines client, business category only.
#[derive(Clone)]
pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NewsApiClient {
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
}

#[async_trait]
impl NewsFeed for NewsApiClient {
    async fn trending_news(&self) -> Result<Vec<Article>, DataError> {
        let url = format!("{}/top-headlines", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("category", "business"),
                ("pageSize", &PAGE_SIZE.to_string()),
                ("apiKey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| DataError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("NewsAPI top-headlines failed ({}): {}", status, message);
            return Err(DataError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let dto = resp
            .json::<HeadlinesDto>()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))?;

        Ok(dto
            .articles
            .into_iter()
            .map(|a| Article {
                title: a.title,
                description: a.description.unwrap_or_default(),
            })
            .collect())
    }
}
