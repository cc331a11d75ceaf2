//! Indicator snapshots consumed by the signal rules.
//!
//! The engine never computes indicators itself; it asks a
//! [`MarketDataPort`](crate::ports::market_port::MarketDataPort) for an
//! [`IndicatorSnapshot`]. The calculators in the submodules back the replay
//! adapter, which has to derive snapshots from recorded bars.

pub mod bollinger;
pub mod ema;
pub mod rsi;

use serde::Serialize;

/// Number of bars every series must carry before rules are evaluated.
pub const MIN_SIGNAL_BARS: usize = 3;

/// Indicator periods and thresholds shared by providers and signal rules.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub bb_period: usize,
    pub bb_deviation: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            bb_period: 20,
            bb_deviation: 2.0,
        }
    }
}

/// Recent indicator values for one symbol/timeframe, most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: Vec<f64>,
    pub ema_slow: Vec<f64>,
    pub rsi: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
}

impl IndicatorSnapshot {
    /// Bars available across all series (the shortest one).
    pub fn bars_available(&self) -> usize {
        [
            self.ema_fast.len(),
            self.ema_slow.len(),
            self.rsi.len(),
            self.bb_upper.len(),
            self.bb_middle.len(),
            self.bb_lower.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0)
    }

    pub fn has_enough_bars(&self) -> bool {
        self.bars_available() >= MIN_SIGNAL_BARS
    }

    /// Compute a snapshot from oldest-first closing prices, keeping the
    /// last `lookback` bars where every indicator is warmed up.
    pub fn from_closes(closes: &[f64], params: &IndicatorParams, lookback: usize) -> Self {
        let fast = ema::calculate_ema(closes, params.ema_fast);
        let slow = ema::calculate_ema(closes, params.ema_slow);
        let rsi = rsi::calculate_rsi(closes, params.rsi_period);
        let bands = bollinger::calculate_bollinger(closes, params.bb_period, params.bb_deviation);

        let mut snapshot = IndicatorSnapshot::default();
        for i in (0..closes.len()).rev() {
            if snapshot.ema_fast.len() == lookback {
                break;
            }
            let (Some(f), Some(s), Some(r), Some(b)) = (fast[i], slow[i], rsi[i], bands[i]) else {
                break;
            };
            snapshot.ema_fast.push(f);
            snapshot.ema_slow.push(s);
            snapshot.rsi.push(r);
            snapshot.bb_upper.push(b.upper);
            snapshot.bb_middle.push(b.middle);
            snapshot.bb_lower.push(b.lower);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_available_is_shortest_series() {
        let snap = IndicatorSnapshot {
            ema_fast: vec![1.0, 1.0, 1.0],
            ema_slow: vec![1.0, 1.0, 1.0],
            rsi: vec![50.0, 50.0],
            bb_upper: vec![2.0, 2.0, 2.0],
            bb_middle: vec![1.0, 1.0, 1.0],
            bb_lower: vec![0.0, 0.0, 0.0],
        };
        assert_eq!(snap.bars_available(), 2);
        assert!(!snap.has_enough_bars());
    }

    #[test]
    fn empty_snapshot_has_no_bars() {
        assert_eq!(IndicatorSnapshot::default().bars_available(), 0);
    }

    #[test]
    fn from_closes_is_most_recent_first() {
        let params = IndicatorParams {
            ema_fast: 2,
            ema_slow: 3,
            rsi_period: 2,
            bb_period: 3,
            ..Default::default()
        };
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let snap = IndicatorSnapshot::from_closes(&closes, &params, 3);
        assert_eq!(snap.bars_available(), 3);
        assert!(snap.ema_fast[0] > snap.ema_fast[1]);
        assert!(snap.bb_middle[0] > snap.bb_middle[2]);
        assert!((snap.bb_middle[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn from_closes_stops_at_warmup() {
        let params = IndicatorParams {
            ema_fast: 2,
            ema_slow: 5,
            rsi_period: 2,
            bb_period: 2,
            ..Default::default()
        };
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let snap = IndicatorSnapshot::from_closes(&closes, &params, 3);
        // slow EMA is valid only from index 4
        assert_eq!(snap.bars_available(), 2);
    }
}
