// src/connectors/paper.rs
use crate::connectors::traits::ExecutionHandler;
use crate::types::{OrderResponse, Side};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

/// Dry-run execution: every order fills instantly at the requested price.
pub struct PaperExecutor {
    starting_balance: Decimal,
}

impl PaperExecutor {
    pub fn new(starting_balance: Decimal) -> Self {
        Self { starting_balance }
    }
}

#[async_trait]
impl ExecutionHandler for PaperExecutor {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderResponse> {
        info!("Paper {:?}: {} {} @ {:?}", side, quantity, symbol, price);
        Ok(OrderResponse {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            status: "FILLED".to_string(),
        })
    }

    async fn get_balance(&self, _asset: &str) -> Result<Decimal> {
        Ok(self.starting_balance)
    }
}
