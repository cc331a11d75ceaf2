//! Market data replayed from recorded bars.
//!
//! Bars are revealed up to a cursor set by [`ReplayMarket::advance_to`].
//! Resampled series are cached per symbol and timeframe and only extended
//! with the bars revealed since the last request. EMA/RSI/Bollinger series
//! are derived from the most recent closes.

use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::adapters::csv_adapter::RecordedBar;
use crate::domain::bar::{Bar, Tick, Timeframe, resample_into};
use crate::domain::error::StageTraderError;
use crate::domain::indicator::{IndicatorParams, IndicatorSnapshot};
use crate::domain::instrument::InstrumentInfo;
use crate::ports::market_port::MarketDataPort;

/// Indicator warm-up, in multiples of the longest indicator period.
const WARMUP_PERIODS: usize = 20;

struct SymbolSeries {
    info: InstrumentInfo,
    bars: Vec<RecordedBar>,
}

/// Resampled bars built from the first `consumed` recorded bars.
#[derive(Default)]
struct Resampled {
    consumed: usize,
    bars: Vec<Bar>,
}

pub struct ReplayMarket {
    params: IndicatorParams,
    series: HashMap<String, SymbolSeries>,
    cursor: Option<NaiveDateTime>,
    resampled: RefCell<HashMap<(String, Timeframe), Resampled>>,
}

impl ReplayMarket {
    pub fn new(params: IndicatorParams) -> Self {
        Self {
            params,
            series: HashMap::new(),
            cursor: None,
            resampled: RefCell::new(HashMap::new()),
        }
    }

    /// Register a symbol. `bars` must be sorted by time.
    pub fn insert(&mut self, symbol: &str, info: InstrumentInfo, bars: Vec<RecordedBar>) {
        self.series
            .insert(symbol.to_string(), SymbolSeries { info, bars });
        self.resampled.get_mut().retain(|(s, _), _| s != symbol);
    }

    /// Reveal bars up to and including `time`.
    pub fn advance_to(&mut self, time: NaiveDateTime) {
        self.cursor = Some(time);
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// First time at which every non-empty series has at least one bar.
    pub fn warmup_end(&self) -> Option<NaiveDateTime> {
        self.series
            .values()
            .filter_map(|s| s.bars.first().map(|r| r.bar.time))
            .max()
    }

    /// One tick per recorded bar across all symbols, in time order. The bid
    /// is the close; the ask adds the bar's spread (or the contract spread).
    pub fn ticks(&self) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = self
            .series
            .iter()
            .flat_map(|(symbol, s)| {
                s.bars.iter().map(move |r| {
                    let spread = r.spread.unwrap_or(s.info.spread);
                    Tick {
                        symbol: symbol.clone(),
                        time: r.bar.time,
                        bid: r.bar.close,
                        ask: s.info.normalize_price(r.bar.close + spread * s.info.point),
                    }
                })
            })
            .collect();
        ticks.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.symbol.cmp(&b.symbol)));
        ticks
    }

    fn series(&self, symbol: &str) -> Result<&SymbolSeries, StageTraderError> {
        self.series
            .get(symbol)
            .ok_or_else(|| StageTraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "symbol not recorded".into(),
            })
    }

    fn visible<'a>(&self, series: &'a SymbolSeries) -> &'a [RecordedBar] {
        match self.cursor {
            Some(cursor) => {
                let end = series.bars.partition_point(|r| r.bar.time <= cursor);
                &series.bars[..end]
            }
            None => &series.bars,
        }
    }

    /// Run `f` over the visible bars of `symbol` resampled to `timeframe`.
    fn with_resampled<T>(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        f: impl FnOnce(&[Bar]) -> T,
    ) -> Result<T, StageTraderError> {
        let visible = self.visible(self.series(symbol)?);
        let mut cache = self.resampled.borrow_mut();
        let entry = cache.entry((symbol.to_string(), timeframe)).or_default();
        // cursor moved backwards
        if visible.len() < entry.consumed {
            *entry = Resampled::default();
        }
        resample_into(
            &mut entry.bars,
            visible[entry.consumed..].iter().map(|r| &r.bar),
            timeframe,
        );
        entry.consumed = visible.len();
        Ok(f(&entry.bars))
    }

    fn warmup_window(&self, lookback: usize) -> usize {
        let p = &self.params;
        let longest = p.ema_fast.max(p.ema_slow).max(p.rsi_period).max(p.bb_period);
        longest.saturating_mul(WARMUP_PERIODS).saturating_add(lookback)
    }
}

impl MarketDataPort for ReplayMarket {
    fn instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, StageTraderError> {
        let series = self.series(symbol)?;
        let mut info = series.info.clone();
        if let Some(spread) = self.visible(series).last().and_then(|r| r.spread) {
            info.spread = spread;
        }
        Ok(info)
    }

    fn price_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bar_count: usize,
    ) -> Result<Vec<Bar>, StageTraderError> {
        self.with_resampled(symbol, timeframe, |bars| {
            let skip = bars.len().saturating_sub(bar_count);
            bars[skip..].to_vec()
        })
    }

    fn indicator_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<IndicatorSnapshot, StageTraderError> {
        let window = self.warmup_window(lookback);
        let closes: Vec<f64> = self.with_resampled(symbol, timeframe, |bars| {
            let skip = bars.len().saturating_sub(window);
            bars[skip..].iter().map(|b| b.close).collect()
        })?;
        let snapshot = IndicatorSnapshot::from_closes(&closes, &self.params, lookback);
        if snapshot.bars_available() < lookback {
            return Err(StageTraderError::InsufficientData {
                symbol: symbol.to_string(),
                bars: snapshot.bars_available(),
                minimum: lookback,
            });
        }
        Ok(snapshot)
    }
}
