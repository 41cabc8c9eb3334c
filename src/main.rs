// src/main.rs
use crate::config::AppConfig;
use crate::connectors::binance::BinanceClient;
use crate::connectors::paper::PaperExecutor;
use crate::connectors::traits::{ExecutionHandler, MarketStream};
use crate::core::engine::TradingEngine;
use crate::strategies::zones::ZoneBook;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod connectors;
mod core;
mod strategies;
mod tui;
mod types;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // The TUI owns stdout, so logs go to a rolling file.
    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::daily("logs", "crosshair.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let config = AppConfig::new()?;
    let zones = ZoneBook::new(config.zones.clone())?;

    println!("========================================");
    println!("        CROSSHAIR - v0.1.0");
    println!("========================================");
    println!("Target: {} ({})", config.symbol, config.interval);
    println!(
        "Mode:   {}",
        if config.live_trading {
            "LIVE TRADING"
        } else {
            "PAPER TRADING"
        }
    );
    println!("Zones:  {}", zones.len());
    println!("========================================");

    info!(
        "Starting for {} ({} candles), live: {}, zones: {}",
        config.symbol,
        config.interval,
        config.live_trading,
        zones.len()
    );

    let mut market = BinanceClient::new(
        config.api_key.clone(),
        config.secret_key.clone(),
        config.strategy.ema_period,
        config.strategy.rsi_period,
    );

    // The same client streams market data and executes orders, so the
    // engine gets its own clone.
    let execution_handler: Box<dyn ExecutionHandler> = if config.live_trading {
        let client = market.clone();
        client.ping().await?;
        Box::new(client)
    } else {
        Box::new(PaperExecutor::new(Decimal::from(1_000)))
    };

    let (snapshot_tx, snapshot_rx) = mpsc::channel(100);
    let (ui_tx, ui_rx) = mpsc::channel(100);

    market
        .subscribe(&config.symbol, &config.interval, snapshot_tx)
        .await?;

    let mut engine = TradingEngine::new(
        config.clone(),
        execution_handler,
        zones,
        snapshot_rx,
        ui_tx,
    );

    if config.tui {
        let symbol = config.symbol.clone();
        let tui_task = tokio::spawn(tui::run(ui_rx, symbol));
        let result = engine.run().await;
        tui_task.abort();
        result
    } else {
        // Headless: drain UI events so the engine's channel never backs up.
        let drain = tokio::spawn(async move {
            let mut rx = ui_rx;
            while rx.recv().await.is_some() {}
        });
        let result = engine.run().await;
        drain.abort();
        result
    }
}
