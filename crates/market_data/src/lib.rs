pub mod remote;
pub mod services;

pub use remote::alpaca_client::AlpacaClient;
pub use remote::alpha_vantage::AlphaVantageClient;
pub use remote::gemini_client::GeminiClient;
pub use remote::news_client::NewsApiClient;
pub use services::signal_service::SignalService;
