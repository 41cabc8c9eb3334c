// src/core/engine.rs
use crate::config::AppConfig;
use crate::connectors::traits::ExecutionHandler;
use crate::core::ledger::PositionLedger;
use crate::strategies::classifier::classify;
use crate::strategies::zones::ZoneBook;
use crate::types::{LedgerAction, MarketSnapshot, Signal, UiEvent};
use crate::utils::precision::{normalize_price, normalize_quantity};
use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Drives one symbol: snapshots in, orders out. Owns the ledger, so every
/// open/evaluate/close runs on this task and nowhere else.
pub struct TradingEngine {
    config: AppConfig,
    execution_handler: Box<dyn ExecutionHandler>,
    zones: ZoneBook,
    ledger: PositionLedger,
    snapshot_receiver: mpsc::Receiver<MarketSnapshot>,
    ui_sender: mpsc::Sender<UiEvent>,
    last_price: Option<Decimal>,
}

impl TradingEngine {
    pub fn new(
        config: AppConfig,
        execution_handler: Box<dyn ExecutionHandler>,
        zones: ZoneBook,
        snapshot_receiver: mpsc::Receiver<MarketSnapshot>,
        ui_sender: mpsc::Sender<UiEvent>,
    ) -> Self {
        Self {
            config,
            execution_handler,
            zones,
            ledger: PositionLedger::new(),
            snapshot_receiver,
            ui_sender,
            last_price: None,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    fn send_ui_event(&self, event: UiEvent) {
        match self.ui_sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("UI channel closed! Interface is likely dead.");
            }
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Engine loop running for {}", self.config.symbol);
        loop {
            tokio::select! {
                maybe_snapshot = self.snapshot_receiver.recv() => {
                    match maybe_snapshot {
                        Some(snapshot) => self.on_snapshot(snapshot).await?,
                        None => {
                            info!("Snapshot stream ended");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }
        self.shutdown().await
    }

    async fn on_snapshot(&mut self, snapshot: MarketSnapshot) -> Result<()> {
        self.last_price = Some(snapshot.price);
        self.send_ui_event(UiEvent::SnapshotUpdate(snapshot.clone()));

        let zone = self.zones.get(&snapshot.symbol);
        let signal = match classify(&snapshot, zone) {
            Ok(signal) => signal,
            Err(e) => {
                // Never trade on a defaulted signal.
                warn!("Discarding snapshot: {}", e);
                return Ok(());
            }
        };
        self.send_ui_event(UiEvent::Signal(signal.clone()));

        if self.ledger.is_open() {
            self.manage_position(snapshot.price).await
        } else {
            self.try_enter(&signal, &snapshot).await
        }
    }

    async fn manage_position(&mut self, price: Decimal) -> Result<()> {
        let action = match self.ledger.evaluate(price) {
            Ok(action) => action,
            Err(e) => {
                warn!("Skipping evaluation: {}", e);
                return Ok(());
            }
        };
        match action {
            LedgerAction::Closed { .. } => self.submit_exit(action, price).await,
            _ => {
                if let Some(pnl) = self.ledger.unrealized_pnl(price) {
                    self.send_ui_event(UiEvent::PnlUpdate(pnl));
                }
                Ok(())
            }
        }
    }

    async fn try_enter(&mut self, signal: &Signal, snapshot: &MarketSnapshot) -> Result<()> {
        let Some(side) = signal.direction.entry_side() else {
            return Ok(());
        };
        if signal.strength < self.config.strategy.min_strength {
            return Ok(());
        }

        let raw_price = signal.entry_price.unwrap_or(snapshot.price);
        let entry_price = normalize_price(raw_price, self.config.symbol_tick_size);

        let order_usdt =
            Decimal::from_f64(self.config.order_size_usdt).unwrap_or(Decimal::from(10));
        let raw_qty = order_usdt / entry_price;
        let quantity = normalize_quantity(raw_qty, self.config.symbol_step_size);

        if quantity.is_zero() {
            warn!("Quantity is zero after normalization. Not entering position.");
            return Ok(());
        }

        let notional_value = quantity * entry_price;
        let min_notional = Decimal::from_str("5.5").unwrap();
        if notional_value < min_notional {
            warn!(
                "Order skipped: notional ${:.2} < ${} minimum. Raw qty: {}, norm qty: {}",
                notional_value, min_notional, raw_qty, quantity
            );
            return Ok(());
        }

        let (stop_pct, tp_pct) = self.exit_thresholds(signal, entry_price);

        info!(
            "Entering {:?} {} {} @ {} (strength {:.2}): {}",
            signal.direction, quantity, snapshot.symbol, entry_price, signal.strength, signal.reason
        );

        match self
            .execution_handler
            .place_order(&self.config.symbol, side, quantity, Some(entry_price))
            .await
        {
            Ok(order) => {
                info!("Order confirmed: {} ({})", order.id, order.status);
                match self
                    .ledger
                    .open(signal.direction, quantity, entry_price, stop_pct, tp_pct)
                {
                    Ok(action) => self.send_ui_event(UiEvent::Action(action)),
                    Err(e) => error!("Ledger rejected entry after fill: {}", e),
                }
            }
            Err(e) => {
                error!("Execution error on entry: {}", e);
            }
        }

        Ok(())
    }

    /// Convert the signal's absolute stop/target levels into fractions of
    /// entry for the ledger. Signals without levels fall back to the
    /// configured defaults.
    fn exit_thresholds(&self, signal: &Signal, entry: Decimal) -> (Decimal, Decimal) {
        let default_stop = self.config.strategy.stop_loss_pct / Decimal::ONE_HUNDRED;
        let default_tp = self.config.strategy.take_profit_pct / Decimal::ONE_HUNDRED;

        let stop_pct = signal
            .stop_loss
            .map(|stop| ((entry - stop) / entry).abs())
            .filter(|pct| *pct > Decimal::ZERO)
            .unwrap_or(default_stop);
        let tp_pct = signal
            .take_profit
            .map(|tp| ((tp - entry) / entry).abs())
            .filter(|pct| *pct > Decimal::ZERO)
            .unwrap_or(default_tp);

        (stop_pct, tp_pct)
    }

    async fn submit_exit(&mut self, action: LedgerAction, price: Decimal) -> Result<()> {
        if let LedgerAction::Closed {
            direction,
            size,
            pnl,
            reason,
            ..
        } = &action
        {
            let Some(side) = direction.exit_side() else {
                return Ok(());
            };
            info!(
                "Closing {:?} {} @ {} ({:?}), PnL: {}",
                direction, size, price, reason, pnl
            );
            if let Err(e) = self
                .execution_handler
                .place_order(&self.config.symbol, side, *size, Some(price))
                .await
            {
                error!("Execution error on close: {}", e);
            }
            self.send_ui_event(UiEvent::Action(action.clone()));
        }
        Ok(())
    }

    /// Final close of whatever is still open, with the last seen price.
    async fn shutdown(&mut self) -> Result<()> {
        if !self.ledger.is_open() {
            return Ok(());
        }
        let Some(price) = self.last_price else {
            warn!("Open position but no price seen yet; leaving it for the operator");
            return Ok(());
        };
        match self.ledger.close(price) {
            Ok(action @ LedgerAction::Closed { .. }) => self.submit_exit(action, price).await,
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Shutdown close failed: {}", e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::connectors::traits::MockExecutionHandler;
    use crate::types::{Direction, ExitReason, OrderResponse};

    fn test_config() -> AppConfig {
        AppConfig {
            api_key: String::new(),
            secret_key: String::new(),
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            live_trading: false,
            tui: false,
            order_size_usdt: 100.0,
            symbol_step_size: Decimal::from_str("0.00001").unwrap(),
            symbol_tick_size: Decimal::from_str("0.01").unwrap(),
            strategy: StrategyConfig {
                ema_period: 9,
                rsi_period: 7,
                min_strength: 0.7,
                stop_loss_pct: Decimal::from_str("2.0").unwrap(),
                take_profit_pct: Decimal::from_str("5.0").unwrap(),
            },
            zones: Vec::new(),
        }
    }

    fn snapshot(price: &str, ema: &str, rsi: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTCUSDT".to_string(),
            price: Decimal::from_str(price).unwrap(),
            ema_short: Decimal::from_str(ema).unwrap(),
            rsi,
            timestamp: 0,
        }
    }

    fn filled_order() -> OrderResponse {
        OrderResponse {
            id: "1".to_string(),
            symbol: "BTCUSDT".to_string(),
            status: "FILLED".to_string(),
        }
    }

    async fn run_engine(
        mock: MockExecutionHandler,
        snapshots: Vec<MarketSnapshot>,
    ) -> (TradingEngine, Vec<UiEvent>) {
        let (snap_tx, snap_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        let mut engine = TradingEngine::new(
            test_config(),
            Box::new(mock),
            ZoneBook::new(Vec::new()).unwrap(),
            snap_rx,
            ui_tx,
        );

        for snap in snapshots {
            snap_tx.send(snap).await.unwrap();
        }
        drop(snap_tx);
        engine.run().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = ui_rx.try_recv() {
            events.push(event);
        }
        (engine, events)
    }

    #[tokio::test]
    async fn opens_on_strong_signal_then_stops_out() {
        let mut mock = MockExecutionHandler::new();
        // One entry, one stop-loss exit.
        mock.expect_place_order()
            .times(2)
            .returning(|_, _, _, _| Ok(filled_order()));

        // 102 vs EMA 100: 2% above, strength clamps to 1.0, stop at 100.
        // Next candle prints 99, through the stop.
        let (engine, events) = run_engine(
            mock,
            vec![snapshot("102", "100", 50.0), snapshot("99", "100", 50.0)],
        )
        .await;

        assert!(engine.ledger().position().is_none());

        let mut opened = None;
        let mut closed = None;
        for event in events {
            match event {
                UiEvent::Action(LedgerAction::Opened { direction, .. }) => {
                    opened = Some(direction);
                }
                UiEvent::Action(LedgerAction::Closed { reason, .. }) => {
                    closed = Some(reason);
                }
                _ => {}
            }
        }
        assert_eq!(opened, Some(Direction::Long));
        assert_eq!(closed, Some(ExitReason::StopLoss));
    }

    #[tokio::test]
    async fn weak_signal_never_reaches_execution() {
        let mut mock = MockExecutionHandler::new();
        mock.expect_place_order().never();

        // 0.4% above EMA: strength ~0.5, below the 0.7 gate.
        let (engine, _) = run_engine(mock, vec![snapshot("100.4", "100", 50.0)]).await;
        assert!(engine.ledger().position().is_none());
    }

    #[tokio::test]
    async fn failed_entry_order_leaves_ledger_flat() {
        let mut mock = MockExecutionHandler::new();
        mock.expect_place_order()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow::anyhow!("venue rejected")));

        let (engine, events) = run_engine(mock, vec![snapshot("102", "100", 50.0)]).await;

        assert!(engine.ledger().position().is_none());
        assert!(!events
            .iter()
            .any(|e| matches!(e, UiEvent::Action(LedgerAction::Opened { .. }))));
    }

    #[tokio::test]
    async fn open_position_closes_on_stream_end() {
        let mut mock = MockExecutionHandler::new();
        // Entry fill plus the shutdown close.
        mock.expect_place_order()
            .times(2)
            .returning(|_, _, _, _| Ok(filled_order()));

        let (engine, events) =
            run_engine(mock, vec![snapshot("102", "100", 50.0)]).await;

        assert!(engine.ledger().position().is_none());
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Action(LedgerAction::Closed {
                reason: ExitReason::Manual,
                ..
            })
        )));
    }
}
