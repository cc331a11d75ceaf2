//! Market data port: contract specs, price history and indicator snapshots.

use crate::domain::bar::{Bar, Timeframe};
use crate::domain::error::StageTraderError;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::instrument::InstrumentInfo;

pub trait MarketDataPort {
    fn instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, StageTraderError>;

    /// Most recent `bar_count` bars, oldest first.
    fn price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bar_count: usize,
    ) -> Result<Vec<Bar>, StageTraderError>;

    /// Indicator series for the last `lookback` bars, most-recent-first.
    fn indicator_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<IndicatorSnapshot, StageTraderError>;
}
