pub mod alpaca_client;
pub mod alpha_vantage;
pub mod gemini_client;
pub mod news_client;
