// src/connectors/traits.rs
use crate::types::{MarketSnapshot, OrderResponse, Side};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Pushes market snapshots into the engine's channel. Implementations own
/// the venue details (streaming, polling, indicator math); the engine only
/// ever sees fully formed snapshots.
#[async_trait]
pub trait MarketStream: Send + Sync {
    async fn subscribe(
        &mut self,
        symbol: &str,
        interval: &str,
        sender: mpsc::Sender<MarketSnapshot>,
    ) -> Result<()>;
}

/// Carries out the orders the engine decides on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderResponse>;

    async fn get_balance(&self, asset: &str) -> Result<Decimal>;
}
