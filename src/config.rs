// src/config.rs

use crate::types::StrategyZone;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub ema_period: usize,
    pub rsi_period: usize,
    /// Entries require at least this signal strength.
    pub min_strength: f64,
    /// Fallback exit thresholds in percent, used when a signal carries no
    /// explicit levels.
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub secret_key: String,
    pub symbol: String,
    /// Candle interval fed to the stream, e.g. "1m".
    pub interval: String,
    pub live_trading: bool,
    pub tui: bool,
    pub order_size_usdt: f64,
    pub symbol_step_size: Decimal,
    pub symbol_tick_size: Decimal,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub zones: Vec<StrategyZone>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings"))
            .add_source(Environment::with_prefix("APP"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}
