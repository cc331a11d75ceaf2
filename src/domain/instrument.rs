//! Tradable instruments and their tick economics.

use serde::Serialize;

use crate::domain::bar::Bar;

/// Broker-reported contract specification of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentInfo {
    /// Current spread in points.
    pub spread: f64,
    pub point: f64,
    pub digits: u32,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    pub tick_value: f64,
    pub tick_size: f64,
}

impl InstrumentInfo {
    /// Account-currency value of a one-point move for one lot.
    pub fn per_point_value(&self) -> f64 {
        if self.tick_size <= 0.0 {
            return 0.0;
        }
        self.tick_value * self.point / self.tick_size
    }

    /// Whether the contract can be traded at all.
    pub fn is_tradable(&self) -> bool {
        self.point > 0.0
            && self.tick_size > 0.0
            && self.tick_value > 0.0
            && self.volume_step > 0.0
            && self.volume_min > 0.0
            && self.volume_max >= self.volume_min
            && self.spread >= 0.0
    }

    /// Convert a distance in points into a price distance.
    pub fn points_to_price(&self, points: f64) -> f64 {
        points * self.point
    }

    /// Round a price to the symbol's quoted digits.
    pub fn normalize_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.digits as i32);
        (price * factor).round() / factor
    }
}

/// A catalog entry: symbol plus cached spread/volatility metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub symbol: String,
    pub spread: f64,
    /// Mean high-low range of the lookback bars, in points.
    pub volatility: f64,
    pub tradable: bool,
    pub info: InstrumentInfo,
}

impl Instrument {
    pub fn new(symbol: &str, info: InstrumentInfo, history: &[Bar]) -> Self {
        Instrument {
            symbol: symbol.to_string(),
            spread: info.spread,
            volatility: volatility_score(history, info.point),
            tradable: info.is_tradable() && !history.is_empty(),
            info,
        }
    }

    /// Refresh cached metrics from a fresh contract spec and history.
    pub fn refresh(&mut self, info: InstrumentInfo, history: &[Bar]) {
        *self = Instrument::new(&self.symbol, info, history);
    }
}

/// Mean high-low range over `bars`, expressed in points.
pub fn volatility_score(bars: &[Bar], point: f64) -> f64 {
    if bars.is_empty() || point <= 0.0 {
        return 0.0;
    }
    let total: f64 = bars.iter().map(Bar::range).sum();
    total / bars.len() as f64 / point
}
