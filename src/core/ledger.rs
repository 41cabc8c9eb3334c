// src/core/ledger.rs
use crate::types::{Direction, ExitReason, LedgerAction, Position};
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    /// The arguments are bad. The ledger state is untouched.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// The state is bad: a position is already open. Distinct from
    /// `InvalidOrder` so callers can tell a race from a typo.
    #[error("position already open: {direction:?} {size} @ {entry_price}")]
    AlreadyOpen {
        direction: Direction,
        size: Decimal,
        entry_price: Decimal,
    },
}

/// Owns the single open position for one symbol and decides when it must
/// leave the book.
///
/// Two states: flat (`position` is `None`) and open. All transitions are
/// `&mut self`, so exclusive ownership is the serialization boundary; two
/// concurrent opens cannot both succeed. No I/O happens here: every
/// transition returns a [`LedgerAction`] for the caller to execute.
#[derive(Debug, Default)]
pub struct PositionLedger {
    position: Option<Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Still queryable after shutdown is requested, so the caller can
    /// issue a final close.
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn unrealized_pnl(&self, current_price: Decimal) -> Option<Decimal> {
        self.position.as_ref().map(|p| p.pnl(current_price))
    }

    /// Flat -> Open. Rejected when a position already exists or when any
    /// argument is non-positive; the existing position is never disturbed
    /// by a rejected open.
    pub fn open(
        &mut self,
        direction: Direction,
        size: Decimal,
        price: Decimal,
        stop_pct: Decimal,
        tp_pct: Decimal,
    ) -> Result<LedgerAction, LedgerError> {
        if let Some(pos) = &self.position {
            return Err(LedgerError::AlreadyOpen {
                direction: pos.direction,
                size: pos.size,
                entry_price: pos.entry_price,
            });
        }
        if direction == Direction::Neutral {
            return Err(LedgerError::InvalidOrder(
                "cannot open a neutral position".to_string(),
            ));
        }
        if size <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "non-positive size {}",
                size
            )));
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "non-positive price {}",
                price
            )));
        }
        if stop_pct <= Decimal::ZERO || tp_pct <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "non-positive exit thresholds: stop {} tp {}",
                stop_pct, tp_pct
            )));
        }

        self.position = Some(Position {
            direction,
            entry_price: price,
            size,
            stop_pct,
            tp_pct,
            opened_at: Utc::now(),
        });
        Ok(LedgerAction::Opened {
            direction,
            size,
            entry_price: price,
        })
    }

    /// Check the open position against its exit thresholds. Stop-loss is
    /// checked before take-profit, so a tick that satisfies both is booked
    /// as a stop (worst-case tie-break). Boundary equality triggers.
    /// Flat ledger: nothing to do.
    pub fn evaluate(&mut self, current_price: Decimal) -> Result<LedgerAction, LedgerError> {
        if current_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "non-positive evaluation price {}",
                current_price
            )));
        }
        let (direction, entry, stop_pct, tp_pct) = match &self.position {
            Some(p) => (p.direction, p.entry_price, p.stop_pct, p.tp_pct),
            None => return Ok(LedgerAction::None),
        };

        let stop_hit = match direction {
            Direction::Long => current_price <= entry * (Decimal::ONE - stop_pct),
            Direction::Short => current_price >= entry * (Decimal::ONE + stop_pct),
            Direction::Neutral => false,
        };
        if stop_hit {
            return Ok(self.close_internal(current_price, ExitReason::StopLoss));
        }

        let tp_hit = match direction {
            Direction::Long => current_price >= entry * (Decimal::ONE + tp_pct),
            Direction::Short => current_price <= entry * (Decimal::ONE - tp_pct),
            Direction::Neutral => false,
        };
        if tp_hit {
            return Ok(self.close_internal(current_price, ExitReason::TakeProfit));
        }

        Ok(LedgerAction::None)
    }

    /// Unconditional manual close. Closing while flat is a benign no-op,
    /// not an error, so callers can close unconditionally at shutdown.
    pub fn close(&mut self, current_price: Decimal) -> Result<LedgerAction, LedgerError> {
        if current_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidOrder(format!(
                "non-positive close price {}",
                current_price
            )));
        }
        if self.position.is_none() {
            return Ok(LedgerAction::None);
        }
        Ok(self.close_internal(current_price, ExitReason::Manual))
    }

    fn close_internal(&mut self, exit_price: Decimal, reason: ExitReason) -> LedgerAction {
        // take() clears direction, entry and size in one move.
        match self.position.take() {
            Some(pos) => LedgerAction::Closed {
                direction: pos.direction,
                size: pos.size,
                exit_price,
                pnl: pos.pnl(exit_price),
                reason,
            },
            None => LedgerAction::None,
        }
    }
}
