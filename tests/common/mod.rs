#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use stagetrader::domain::bar::{Bar, Tick, Timeframe};
use stagetrader::domain::config::{EngineConfig, StageProfile, StageProfiles};
use stagetrader::domain::error::StageTraderError;
use stagetrader::domain::indicator::IndicatorSnapshot;
use stagetrader::domain::instrument::InstrumentInfo;
use stagetrader::domain::position::{ClosedTrade, Direction, OrderRequest, Position};
use stagetrader::ports::broker_port::BrokerPort;
use stagetrader::ports::market_port::MarketDataPort;
use std::collections::{HashMap, HashSet};

pub const TAG: &str = "stagetrader";

pub struct MockMarket {
    pub infos: HashMap<String, InstrumentInfo>,
    pub ranges: HashMap<String, f64>,
    pub snapshots: HashMap<String, IndicatorSnapshot>,
    pub unavailable: HashSet<String>,
    pub broken_indicators: HashSet<String>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            infos: HashMap::new(),
            ranges: HashMap::new(),
            snapshots: HashMap::new(),
            unavailable: HashSet::new(),
            broken_indicators: HashSet::new(),
        }
    }

    /// Register a symbol with the given spread (points) and mean bar range.
    pub fn with_symbol(mut self, symbol: &str, spread: f64, range: f64) -> Self {
        self.infos.insert(symbol.to_string(), forex_info(spread));
        self.ranges.insert(symbol.to_string(), range);
        self
    }

    pub fn with_snapshot(mut self, symbol: &str, snapshot: IndicatorSnapshot) -> Self {
        self.snapshots.insert(symbol.to_string(), snapshot);
        self
    }

    pub fn set_snapshot(&mut self, symbol: &str, snapshot: IndicatorSnapshot) {
        self.snapshots.insert(symbol.to_string(), snapshot);
    }
}

impl MarketDataPort for MockMarket {
    fn instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, StageTraderError> {
        if self.unavailable.contains(symbol) {
            return Err(StageTraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "feed down".into(),
            });
        }
        self.infos
            .get(symbol)
            .cloned()
            .ok_or_else(|| StageTraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".into(),
            })
    }

    fn price_history(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        bar_count: usize,
    ) -> Result<Vec<Bar>, StageTraderError> {
        let range = self
            .ranges
            .get(symbol)
            .copied()
            .ok_or_else(|| StageTraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no history".into(),
            })?;
        Ok((0..bar_count)
            .map(|i| Bar {
                time: t0() - Duration::hours((bar_count - i) as i64),
                open: 1.1,
                high: 1.1 + range,
                low: 1.1,
                close: 1.1,
            })
            .collect())
    }

    fn indicator_snapshot(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        lookback: usize,
    ) -> Result<IndicatorSnapshot, StageTraderError> {
        if self.broken_indicators.contains(symbol) {
            return Err(StageTraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "indicator handle invalid".into(),
            });
        }
        match self.snapshots.get(symbol) {
            Some(s) => Ok(s.clone()),
            None => Err(StageTraderError::InsufficientData {
                symbol: symbol.to_string(),
                bars: 0,
                minimum: lookback,
            }),
        }
    }
}

pub struct MockBroker {
    pub balance: f64,
    pub fill_price: f64,
    pub next_id: u64,
    pub positions: Vec<Position>,
    pub closed: Vec<ClosedTrade>,
    pub placed: Vec<OrderRequest>,
    pub modifications: Vec<(u64, f64)>,
    pub reject_close: HashSet<u64>,
    pub reject_orders: bool,
    pub balance_error: bool,
}

impl MockBroker {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            fill_price: 1.1,
            next_id: 1,
            positions: Vec::new(),
            closed: Vec::new(),
            placed: Vec::new(),
            modifications: Vec::new(),
            reject_close: HashSet::new(),
            reject_orders: false,
            balance_error: false,
        }
    }

    /// Add an engine-tagged position directly.
    pub fn open(&mut self, symbol: &str, direction: Direction, entry: f64, stop_loss: f64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.positions.push(Position {
            id,
            symbol: symbol.to_string(),
            direction,
            volume: 0.1,
            entry_price: entry,
            stop_loss,
            take_profit: 0.0,
            tag: TAG.to_string(),
        });
        id
    }

    /// Queue a closed trade and apply its P&L to the balance.
    pub fn close_with_pnl(&mut self, symbol: &str, pnl: f64) {
        self.balance += pnl;
        let id = self.next_id;
        self.next_id += 1;
        self.closed.push(ClosedTrade {
            position_id: id,
            symbol: symbol.to_string(),
            direction: Direction::Buy,
            volume: 0.1,
            entry_price: 1.1,
            exit_price: 1.1,
            pnl,
        });
    }

    pub fn stop_of(&self, id: u64) -> Option<f64> {
        self.positions.iter().find(|p| p.id == id).map(|p| p.stop_loss)
    }
}

impl BrokerPort for MockBroker {
    fn account_balance(&self) -> Result<f64, StageTraderError> {
        if self.balance_error {
            return Err(StageTraderError::Timeout {
                operation: "account_balance".into(),
            });
        }
        Ok(self.balance)
    }

    fn take_closed_trades(&mut self) -> Vec<ClosedTrade> {
        std::mem::take(&mut self.closed)
    }

    fn place_order(&mut self, request: &OrderRequest) -> Result<u64, StageTraderError> {
        self.placed.push(request.clone());
        if self.reject_orders {
            return Err(StageTraderError::OrderRejected {
                symbol: request.symbol.clone(),
                reason: "market closed".into(),
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.positions.push(Position {
            id,
            symbol: request.symbol.clone(),
            direction: request.direction,
            volume: request.volume,
            entry_price: self.fill_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            tag: request.tag.clone(),
        });
        Ok(id)
    }

    fn modify_stop_loss(
        &mut self,
        position_id: u64,
        stop_loss: f64,
    ) -> Result<(), StageTraderError> {
        self.modifications.push((position_id, stop_loss));
        match self.positions.iter_mut().find(|p| p.id == position_id) {
            Some(p) => {
                p.stop_loss = stop_loss;
                Ok(())
            }
            None => Err(StageTraderError::ModifyRejected {
                position_id,
                reason: "unknown position".into(),
            }),
        }
    }

    fn close_position(&mut self, position_id: u64) -> Result<(), StageTraderError> {
        if self.reject_close.contains(&position_id) {
            return Err(StageTraderError::CloseRejected {
                position_id,
                reason: "requote".into(),
            });
        }
        let idx = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| StageTraderError::CloseRejected {
                position_id,
                reason: "unknown position".into(),
            })?;
        let p = self.positions.remove(idx);
        self.closed.push(ClosedTrade {
            position_id,
            symbol: p.symbol,
            direction: p.direction,
            volume: p.volume,
            entry_price: p.entry_price,
            exit_price: p.entry_price,
            pnl: 0.0,
        });
        Ok(())
    }

    fn open_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>, StageTraderError> {
        Ok(self
            .positions
            .iter()
            .filter(|p| symbol.is_none_or(|s| p.symbol == s))
            .cloned()
            .collect())
    }
}

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn at(minutes: i64) -> NaiveDateTime {
    t0() + Duration::minutes(minutes)
}

pub fn forex_info(spread: f64) -> InstrumentInfo {
    InstrumentInfo {
        spread,
        point: 0.00001,
        digits: 5,
        volume_min: 0.01,
        volume_max: 100.0,
        volume_step: 0.01,
        tick_value: 1.0,
        tick_size: 0.00001,
    }
}

pub fn tick(symbol: &str, time: NaiveDateTime, bid: f64) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        time,
        bid,
        ask: bid + 0.0001,
    }
}

/// Snapshot from oldest-first triples with flat Bollinger bands.
pub fn snapshot(
    fast: [f64; 3],
    slow: [f64; 3],
    rsi: [f64; 3],
    band: (f64, f64, f64),
) -> IndicatorSnapshot {
    let rev = |a: [f64; 3]| vec![a[2], a[1], a[0]];
    IndicatorSnapshot {
        ema_fast: rev(fast),
        ema_slow: rev(slow),
        rsi: rev(rsi),
        bb_upper: vec![band.0; 3],
        bb_middle: vec![band.1; 3],
        bb_lower: vec![band.2; 3],
    }
}

/// Safer-stage buy at any price above 1.09.
pub fn safer_buy() -> IndicatorSnapshot {
    snapshot(
        [1.10, 1.11, 1.12],
        [1.09, 1.09, 1.10],
        [55.0, 58.0, 60.0],
        (1.12, 1.09, 1.06),
    )
}

/// Scalping-stage buy at any price above 1.09.
pub fn scalping_buy() -> IndicatorSnapshot {
    snapshot(
        [1.08, 1.08, 1.11],
        [1.09, 1.09, 1.10],
        [25.0, 28.0, 35.0],
        (1.12, 1.09, 1.06),
    )
}

pub fn flat() -> IndicatorSnapshot {
    snapshot([1.1; 3], [1.1; 3], [50.0; 3], (1.12, 1.1, 1.08))
}

/// Thresholds 20/100, 5% risk on a 25-point stop, no trailing.
pub fn engine_config() -> EngineConfig {
    let profile = |symbols: &[&str], timeframe| StageProfile {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        timeframe,
    };
    let mut config = EngineConfig {
        stages: StageProfiles {
            scalping: profile(&["EURUSD", "GBPUSD"], Timeframe::M5),
            safer: profile(&["EURUSD", "GBPUSD"], Timeframe::H1),
            swing: profile(&["XAUUSD", "EURUSD"], Timeframe::H4),
        },
        ..EngineConfig::default()
    };
    config.order_tag = TAG.to_string();
    config.trade.risk_percent = 5.0;
    config.trade.stop_loss_points = 25.0;
    config.trade.take_profit_points = 50.0;
    config.trade.trailing_points = 0.0;
    config
}
