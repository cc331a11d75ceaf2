//! Positions, order requests and closed trades.
//!
//! Positions are owned by the broker; the engine reads them and requests
//! modifications. A `stop_loss` or `take_profit` of `0.0` means "not set".

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for longs, -1 for shorts.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub tag: String,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Buy
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Sell
    }

    pub fn has_stop_loss(&self) -> bool {
        self.stop_loss != 0.0
    }

    /// Price move in the position's favour (negative when losing).
    pub fn favourable_move(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if !self.has_stop_loss() {
            return false;
        }
        if self.is_long() {
            price <= self.stop_loss
        } else {
            price >= self.stop_loss
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        if self.is_long() {
            price >= self.take_profit
        } else {
            price <= self.take_profit
        }
    }

    /// New stop-loss a trailing distance behind `price`, if it tightens.
    ///
    /// Longs only trail once an initial stop exists and the candidate is
    /// above it. Shorts trail when the candidate is below the current stop
    /// or no stop is set yet.
    pub fn trailing_candidate(&self, price: f64, distance: f64) -> Option<f64> {
        match self.direction {
            Direction::Buy => {
                let candidate = price - distance;
                (self.has_stop_loss() && candidate > self.stop_loss).then_some(candidate)
            }
            Direction::Sell => {
                let candidate = price + distance;
                (!self.has_stop_loss() || candidate < self.stop_loss).then_some(candidate)
            }
        }
    }
}

/// Market order submitted to the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub tag: String,
}

/// Realized result of a position the broker has closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub position_id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}
