use anyhow::Context;
use dotenvy::dotenv;
use std::{env, sync::Arc, time::Duration};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use common::logger;
use market_data::remote::alpaca_client::AlpacaClient;
use market_data::remote::alpha_vantage::AlphaVantageClient;
use market_data::remote::gemini_client::GeminiClient;
use market_data::remote::news_client::NewsApiClient;
use market_data::services::signal_service::SignalService;
use storage::ledger::PositionLedger;

use crate::services::cycle_service::CycleService;
use crate::services::execution_service::ExecutionService;

mod services;

const DEFAULT_ALPACA_URL: &str = "https://paper-api.alpaca.markets";
const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 3600;
const DEFAULT_STARTING_BALANCE: f64 = 100_000.0;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    info!("tradr starting up");

    let alpaca_key = env::var("APCA_API_KEY_ID").context("APCA_API_KEY_ID not set")?;
    let alpaca_secret = env::var("APCA_API_SECRET_KEY").context("APCA_API_SECRET_KEY not set")?;
    let alpha_vantage_key =
        env::var("ALPHAVANTAGE_API_KEY").context("ALPHAVANTAGE_API_KEY not set")?;
    let newsapi_key = env::var("NEWSAPI_KEY").context("NEWSAPI_KEY not set")?;
    let gemini_key = env::var("GEMINI_API_KEY").context("GEMINI_API_KEY not set")?;

    let alpaca_url = env::var("APCA_BASE_URL").unwrap_or_else(|_| DEFAULT_ALPACA_URL.to_string());
    let data_folder = env::var("DATA_FOLDER").unwrap_or_else(|_| ".".to_string());
    let interval_secs: u64 = env_or("CYCLE_INTERVAL_SECS", DEFAULT_CYCLE_INTERVAL_SECS);
    let starting_balance: f64 = env_or("STARTING_BALANCE", DEFAULT_STARTING_BALANCE);

    let pool = storage::db::connect(&data_folder).await?;

    let broker = AlpacaClient::new(&alpaca_url, &alpaca_key, &alpaca_secret)?;
    let prices = AlphaVantageClient::new(&alpha_vantage_key)?;
    let news = NewsApiClient::new(&newsapi_key)?;
    let model = GeminiClient::new(&gemini_key)?;

    let ledger = Arc::new(Mutex::new(PositionLedger::new(starting_balance)));
    let signals = SignalService::new(news, prices.clone(), model);
    let execution = ExecutionService::new(broker.clone(), pool, ledger);
    let cycles = CycleService::new(broker, prices, signals, execution);

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = cancel_tx.send(true);
        }
    });

    // Strictly sequential: a cycle finishes before the next tick is awaited,
    // so cycles can never overlap.
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel_rx.changed() => break,
        }

        match cycles.run_cycle(&cancel_rx).await {
            Ok(report) => info!(
                "Cycle complete in {}s: {}",
                (report.finished_at - report.started_at).num_seconds(),
                report.execution.summary
            ),
            Err(e) => error!("Cycle aborted: {}", e),
        }

        if *cancel_rx.borrow() {
            break;
        }
    }

    info!("tradr stopped");
    Ok(())
}
