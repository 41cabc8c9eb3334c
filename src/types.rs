// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side sent to the execution venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Directional read of the market. `Neutral` signals carry no levels and
/// must never turn into an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// Order side that opens a position in this direction.
    pub fn entry_side(self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Buy),
            Direction::Short => Some(Side::Sell),
            Direction::Neutral => None,
        }
    }

    /// Order side that flattens a position in this direction.
    pub fn exit_side(self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Sell),
            Direction::Short => Some(Side::Buy),
            Direction::Neutral => None,
        }
    }
}

/// One observation of the market, produced per closed candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    /// Short-period EMA of the close, same unit as `price`.
    pub ema_short: Decimal,
    /// RSI in [0, 100]. Upstream feeds occasionally drift outside the
    /// bounds; the classifier clamps.
    pub rsi: f64,
    pub timestamp: u64,
}

/// Classifier output. Recomputed every tick, no identity beyond that.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub direction: Direction,
    /// Confidence in [0, 1].
    pub strength: f64,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Diagnostic text. Informational only, never used for control flow.
    pub reason: String,
}

impl Signal {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Neutral,
            strength: 0.0,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            reason: reason.into(),
        }
    }
}

/// Operator's stance on a zone: which side of it they want to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Long,
    Short,
    Watch,
    Neutral,
}

/// Operator-declared support/resistance band with ordered targets.
/// Loaded at startup, never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyZone {
    pub symbol: String,
    /// 0 = maximally bearish, 10 = maximally bullish.
    pub bias_score: u8,
    pub recommendation: Recommendation,
    pub long_level: Decimal,
    pub short_level: Decimal,
    pub take_profit_1: Decimal,
    pub take_profit_2: Decimal,
}

/// The one open position. The ledger holds `Option<Position>`, so the
/// direction/entry/size fields appear and disappear together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub size: Decimal,
    /// Exit thresholds as fractions of entry (0.02 = 2%), fixed at open
    /// from the signal that triggered the entry.
    pub stop_pct: Decimal,
    pub tp_pct: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn pnl(&self, current_price: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => (current_price - self.entry_price) * self.size,
            Direction::Short => (self.entry_price - current_price) * self.size,
            // Never stored; open() rejects neutral directions.
            Direction::Neutral => Decimal::ZERO,
        }
    }
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

/// What the ledger did with a tick, for the caller to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerAction {
    None,
    Opened {
        direction: Direction,
        size: Decimal,
        entry_price: Decimal,
    },
    Closed {
        direction: Direction,
        size: Decimal,
        exit_price: Decimal,
        pnl: Decimal,
        reason: ExitReason,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    SnapshotUpdate(MarketSnapshot),
    Signal(Signal),
    Action(LedgerAction),
    PnlUpdate(Decimal),
    Log(String),
}
