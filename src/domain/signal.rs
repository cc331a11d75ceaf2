//! Stage-specific entry rules.
//!
//! Each stage maps to one [`StrategyKind`]; every variant evaluates the same
//! kind of input (an [`IndicatorSnapshot`] plus the current price) and
//! returns a [`Signal`]. Series index 0 is the current bar.

use serde::Serialize;
use std::fmt;

use crate::domain::indicator::{IndicatorSnapshot, MIN_SIGNAL_BARS};
use crate::domain::position::Direction;
use crate::domain::stage::Stage;

const RSI_MIDLINE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StrategyKind {
    /// EMA cross + RSI leaving an extreme + Bollinger middle confirmation.
    Scalping,
    /// EMA trend + RSI on the trend side of 50 + Bollinger middle confirmation.
    Safer,
    /// Three-bar EMA trend + RSI pullback turning + outer band filter.
    Swing,
}

impl From<Stage> for StrategyKind {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Scalping => StrategyKind::Scalping,
            Stage::Safer => StrategyKind::Safer,
            Stage::Swing => StrategyKind::Swing,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Scalping => f.write_str("scalp"),
            StrategyKind::Safer => f.write_str("safer"),
            StrategyKind::Swing => f.write_str("swing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RsiThresholds {
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiThresholds {
    fn default() -> Self {
        RsiThresholds {
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub direction: Option<Direction>,
    pub strategy: StrategyKind,
}

impl Signal {
    pub fn none(strategy: StrategyKind) -> Self {
        Signal {
            direction: None,
            strategy,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction.is_some()
    }
}

impl StrategyKind {
    pub fn evaluate(
        self,
        snapshot: &IndicatorSnapshot,
        price: f64,
        thresholds: &RsiThresholds,
    ) -> Signal {
        if !snapshot.has_enough_bars() {
            return Signal::none(self);
        }
        let direction = match self {
            StrategyKind::Scalping => scalping(snapshot, price, thresholds),
            StrategyKind::Safer => safer(snapshot, price, thresholds),
            StrategyKind::Swing => swing(snapshot, price),
        };
        Signal {
            direction,
            strategy: self,
        }
    }
}

fn scalping(s: &IndicatorSnapshot, price: f64, t: &RsiThresholds) -> Option<Direction> {
    let crossed_up = s.ema_fast[1] <= s.ema_slow[1] && s.ema_fast[0] > s.ema_slow[0];
    let crossed_down = s.ema_fast[1] >= s.ema_slow[1] && s.ema_fast[0] < s.ema_slow[0];
    let rsi_leaves_oversold = s.rsi[1] <= t.oversold && s.rsi[0] > t.oversold;
    let rsi_leaves_overbought = s.rsi[1] >= t.overbought && s.rsi[0] < t.overbought;

    if crossed_up && rsi_leaves_oversold && price > s.bb_middle[0] {
        Some(Direction::Buy)
    } else if crossed_down && rsi_leaves_overbought && price < s.bb_middle[0] {
        Some(Direction::Sell)
    } else {
        None
    }
}

fn safer(s: &IndicatorSnapshot, price: f64, t: &RsiThresholds) -> Option<Direction> {
    let rsi = s.rsi[0];
    if s.ema_fast[0] > s.ema_slow[0]
        && rsi > RSI_MIDLINE
        && rsi < t.overbought
        && price > s.bb_middle[0]
    {
        Some(Direction::Buy)
    } else if s.ema_fast[0] < s.ema_slow[0]
        && rsi > t.oversold
        && rsi < RSI_MIDLINE
        && price < s.bb_middle[0]
    {
        Some(Direction::Sell)
    } else {
        None
    }
}

fn swing(s: &IndicatorSnapshot, price: f64) -> Option<Direction> {
    let bars = 0..MIN_SIGNAL_BARS;
    let sustained_up = bars.clone().all(|i| s.ema_fast[i] > s.ema_slow[i]);
    let sustained_down = bars.into_iter().all(|i| s.ema_fast[i] < s.ema_slow[i]);

    if sustained_up && s.rsi[0] < RSI_MIDLINE && s.rsi[0] > s.rsi[1] && price > s.bb_lower[0] {
        Some(Direction::Buy)
    } else if sustained_down
        && s.rsi[0] > RSI_MIDLINE
        && s.rsi[0] < s.rsi[1]
        && price < s.bb_upper[0]
    {
        Some(Direction::Sell)
    } else {
        None
    }
}

/// Picks the strategy for the stage and applies the position-cap skip.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEngine {
    thresholds: RsiThresholds,
    max_open_positions: usize,
}

impl SignalEngine {
    pub fn new(thresholds: RsiThresholds, max_open_positions: usize) -> Self {
        Self {
            thresholds,
            max_open_positions,
        }
    }

    pub fn evaluate(
        &self,
        stage: Stage,
        snapshot: &IndicatorSnapshot,
        price: f64,
        open_positions: usize,
    ) -> Signal {
        let strategy = StrategyKind::from(stage);
        if open_positions >= self.max_open_positions {
            return Signal::none(strategy);
        }
        strategy.evaluate(snapshot, price, &self.thresholds)
    }
}
