//! The tick handler.
//!
//! One [`Engine`] owns every piece of mutable decision state: account
//! statistics, risk gate, active stage, catalog and active instrument.
//! `on_tick` and `on_timer` both take `&mut self`, so the periodic re-scan
//! can never interleave with a tick.
//!
//! Per tick:
//! 1. refresh balance and record closed trades
//! 2. recompute the stage (rebuild catalog, reselect, queue liquidation)
//! 3. retry any pending liquidation
//! 4. trail stops on the ticked symbol (also while halted)
//! 5. gate, evaluate, size and place a new entry on the active instrument

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::account::{AccountState, AccountTracker};
use super::bar::Tick;
use super::catalog::{InstrumentCatalog, SkippedSymbol};
use super::config::EngineConfig;
use super::error::StageTraderError;
use super::indicator::MIN_SIGNAL_BARS;
use super::position::{Direction, OrderRequest};
use super::position_manager::{LiquidationReport, PositionManager, TrailOutcome};
use super::risk_gate::{Denial, GateState, RiskGate};
use super::selector::{Selection, select_best};
use super::signal::{Signal, SignalEngine};
use super::sizing::PositionSizer;
use super::stage::{Stage, StageTransition, detect_transition};
use crate::ports::broker_port::BrokerPort;
use crate::ports::market_port::MarketDataPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineStatus {
    Running,
    Disabled,
    Halted { reason: String },
    Faulted { reason: String },
}

/// Control requests from an external observer (dashboard, operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineIntent {
    Enable,
    Disable,
    ResumeTrading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TickSkip {
    Disabled,
    NotActiveSymbol,
    Liquidating { pending: Vec<String> },
    Denied(Denial),
    PositionCap { open: usize },
    InsufficientData { bars: usize },
    Transient(String),
    NoSignal,
    Sizing(String),
    OrderRejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TickOutcome {
    Entered {
        position_id: u64,
        direction: Direction,
        volume: f64,
    },
    Skipped(TickSkip),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub stage_change: Option<StageTransition>,
    pub liquidation: Option<LiquidationReport>,
    pub trailing: Vec<TrailOutcome>,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn skipped(reason: TickSkip) -> Self {
        TickReport {
            stage_change: None,
            liquidation: None,
            trailing: Vec::new(),
            outcome: TickOutcome::Skipped(reason),
        }
    }

    pub fn entered(&self) -> bool {
        matches!(self.outcome, TickOutcome::Entered { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerReport {
    pub rescanned: bool,
    pub stage_change: Option<StageTransition>,
    pub switched_from: Option<String>,
}

/// Serializable state for dashboards and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub status: EngineStatus,
    pub enabled: bool,
    pub stage: Stage,
    pub active_symbol: String,
    pub active_score: f64,
    pub account: AccountState,
    pub win_rate: f64,
    pub gate: GateState,
    pub pending_liquidation: Vec<String>,
    pub candidates: Vec<String>,
    pub skipped_candidates: Vec<SkippedSymbol>,
    pub last_signal: Option<Signal>,
    pub last_tick: Option<NaiveDateTime>,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    tracker: AccountTracker,
    gate: RiskGate,
    signals: SignalEngine,
    positions: PositionManager,
    sizer: PositionSizer,
    stage: Stage,
    catalog: InstrumentCatalog,
    active: Selection,
    pending_liquidation: Vec<String>,
    enabled: bool,
    fault: Option<String>,
    last_rescan: NaiveDateTime,
    last_signal: Option<Signal>,
    last_tick: Option<NaiveDateTime>,
}

impl Engine {
    /// Build the catalog for the starting stage, select an instrument and
    /// probe its indicator source. Any failure here is fatal.
    pub fn start(
        config: EngineConfig,
        market: &dyn MarketDataPort,
        broker: &mut dyn BrokerPort,
        now: NaiveDateTime,
    ) -> Result<Engine, StageTraderError> {
        let balance = broker.account_balance()?;
        let tracker = AccountTracker::new(balance);
        let stage = config.thresholds.stage_for(balance);

        let profile = config.stages.get(stage);
        let catalog =
            InstrumentCatalog::build(market, stage, &profile.symbols, config.volatility_lookback)?;
        let active = select_best(&catalog, stage, &config.selector)?;

        match market.indicator_snapshot(&active.symbol, profile.timeframe, MIN_SIGNAL_BARS) {
            Ok(_) | Err(StageTraderError::InsufficientData { .. }) => {}
            Err(e) => {
                return Err(StageTraderError::IndicatorUnavailable {
                    symbol: active.symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            balance,
            stage = %stage,
            symbol = %active.symbol,
            score = active.score,
            "engine started"
        );

        Ok(Engine {
            gate: RiskGate::new(config.limits),
            signals: SignalEngine::new(config.rsi_thresholds(), config.max_open_positions),
            positions: PositionManager::new(config.trade.trailing_points, config.order_tag.clone()),
            sizer: PositionSizer,
            tracker,
            stage,
            catalog,
            active,
            pending_liquidation: Vec::new(),
            enabled: config.enabled,
            fault: None,
            last_rescan: now,
            last_signal: None,
            last_tick: None,
            config,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn active_symbol(&self) -> &str {
        &self.active.symbol
    }

    pub fn account(&self) -> &AccountState {
        self.tracker.state()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pending_liquidation(&self) -> &[String] {
        &self.pending_liquidation
    }

    pub fn status(&self) -> EngineStatus {
        if let Some(reason) = &self.fault {
            return EngineStatus::Faulted {
                reason: reason.clone(),
            };
        }
        if !self.enabled {
            return EngineStatus::Disabled;
        }
        match self.gate.state() {
            GateState::Halted(reason) => EngineStatus::Halted {
                reason: reason.to_string(),
            },
            GateState::Allowed => EngineStatus::Running,
        }
    }

    pub fn submit(&mut self, intent: EngineIntent) {
        match intent {
            EngineIntent::Enable => {
                info!("engine enabled");
                self.enabled = true;
            }
            EngineIntent::Disable => {
                info!("engine disabled");
                self.enabled = false;
            }
            EngineIntent::ResumeTrading => self.gate.request_resume(&mut self.tracker),
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            status: self.status(),
            enabled: self.enabled,
            stage: self.stage,
            active_symbol: self.active.symbol.clone(),
            active_score: self.active.score,
            account: self.tracker.state().clone(),
            win_rate: self.tracker.state().win_rate(),
            gate: self.gate.state(),
            pending_liquidation: self.pending_liquidation.clone(),
            candidates: self.catalog.iter().map(|i| i.symbol.clone()).collect(),
            skipped_candidates: self.catalog.skipped().to_vec(),
            last_signal: self.last_signal,
            last_tick: self.last_tick,
        }
    }

    pub fn on_tick(
        &mut self,
        tick: &Tick,
        market: &dyn MarketDataPort,
        broker: &mut dyn BrokerPort,
    ) -> Result<TickReport, StageTraderError> {
        self.ensure_not_faulted()?;

        let balance = match broker.account_balance() {
            Ok(b) => b,
            Err(e) => return transient_skip(e),
        };
        self.last_tick = Some(tick.time);
        for trade in broker.take_closed_trades() {
            debug!(position = trade.position_id, pnl = trade.pnl, "trade closed");
            self.tracker.record_closed_trade(&trade);
            self.gate.record_trade_result(trade.pnl, tick.time);
        }
        self.tracker.refresh(balance);

        let mut report = TickReport::skipped(TickSkip::NoSignal);
        report.stage_change = self.check_stage(balance, market)?;
        report.liquidation = self.retry_liquidation(broker);

        let info = match self.catalog.get(&tick.symbol) {
            Some(entry) => Some(entry.info.clone()),
            None => market.instrument_info(&tick.symbol).ok(),
        };
        if let Some(info) = info {
            match self
                .positions
                .trail_all(broker, &tick.symbol, tick.bid, tick.ask, &info)
            {
                Ok(outcomes) => report.trailing = outcomes,
                Err(e) => debug!(error = %e, "trailing skipped"),
            }
        }

        report.outcome = match self.try_entry(tick, market, broker) {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                debug!(symbol = %tick.symbol, error = %e, "tick skipped");
                TickOutcome::Skipped(TickSkip::Transient(e.to_string()))
            }
            Err(e) => return Err(e),
        };
        Ok(report)
    }

    /// Periodic re-scan: re-check the stage, refresh catalog metrics and
    /// reselect. Does nothing until the re-scan interval has elapsed.
    pub fn on_timer(
        &mut self,
        now: NaiveDateTime,
        market: &dyn MarketDataPort,
        broker: &mut dyn BrokerPort,
    ) -> Result<TimerReport, StageTraderError> {
        self.ensure_not_faulted()?;

        let mut report = TimerReport {
            rescanned: false,
            stage_change: None,
            switched_from: None,
        };
        if now - self.last_rescan < self.config.rescan_interval() {
            return Ok(report);
        }

        let balance = match broker.account_balance() {
            Ok(b) => b,
            Err(e) if e.is_transient() => {
                debug!(error = %e, "re-scan deferred");
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        self.tracker.refresh(balance);
        self.last_rescan = now;
        report.rescanned = true;

        report.stage_change = self.check_stage(balance, market)?;
        if report.stage_change.is_some() {
            return Ok(report);
        }

        self.catalog.refresh(market, self.config.volatility_lookback);
        let best = match select_best(&self.catalog, self.stage, &self.config.selector) {
            Ok(best) => best,
            Err(e) => return Err(self.enter_fault(e)),
        };
        if best.symbol != self.active.symbol {
            info!(from = %self.active.symbol, to = %best.symbol, "switching instrument");
            let previous = std::mem::replace(&mut self.active, best);
            self.queue_liquidation(previous.symbol.clone());
            report.switched_from = Some(previous.symbol);
        } else {
            self.active = best;
        }
        Ok(report)
    }

    fn ensure_not_faulted(&self) -> Result<(), StageTraderError> {
        match &self.fault {
            Some(reason) => Err(StageTraderError::Faulted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn enter_fault(&mut self, err: StageTraderError) -> StageTraderError {
        error!(error = %err, "engine faulted");
        self.fault = Some(err.to_string());
        err
    }

    fn check_stage(
        &mut self,
        balance: f64,
        market: &dyn MarketDataPort,
    ) -> Result<Option<StageTransition>, StageTraderError> {
        let Some(transition) = detect_transition(self.stage, balance, &self.config.thresholds)
        else {
            return Ok(None);
        };
        info!(from = %transition.from, to = %transition.to, balance, "stage changed");

        let symbols = &self.config.stages.get(transition.to).symbols;
        let catalog = match InstrumentCatalog::build(
            market,
            transition.to,
            symbols,
            self.config.volatility_lookback,
        ) {
            Ok(c) => c,
            Err(e) => return Err(self.enter_fault(e)),
        };
        let best = match select_best(&catalog, transition.to, &self.config.selector) {
            Ok(best) => best,
            Err(e) => return Err(self.enter_fault(e)),
        };

        let previous = std::mem::replace(&mut self.active, best);
        self.queue_liquidation(previous.symbol);
        self.stage = transition.to;
        self.catalog = catalog;
        info!(symbol = %self.active.symbol, score = self.active.score, "instrument selected");
        Ok(Some(transition))
    }

    fn queue_liquidation(&mut self, symbol: String) {
        if !self.pending_liquidation.contains(&symbol) {
            self.pending_liquidation.push(symbol);
        }
    }

    fn retry_liquidation(&mut self, broker: &mut dyn BrokerPort) -> Option<LiquidationReport> {
        if self.pending_liquidation.is_empty() {
            return None;
        }
        let mut combined = LiquidationReport::default();
        let mut still_pending = Vec::new();

        for symbol in std::mem::take(&mut self.pending_liquidation) {
            match self.positions.liquidate_all(broker, &symbol) {
                Ok(report) => {
                    combined.attempted += report.attempted;
                    combined.closed += report.closed;
                    combined.failed.extend(&report.failed);
                    if !report.is_complete() {
                        still_pending.push(symbol);
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "liquidation deferred");
                    still_pending.push(symbol);
                }
            }
        }

        self.pending_liquidation = still_pending;
        Some(combined)
    }

    fn try_entry(
        &mut self,
        tick: &Tick,
        market: &dyn MarketDataPort,
        broker: &mut dyn BrokerPort,
    ) -> Result<TickOutcome, StageTraderError> {
        // evaluated first so a breach is latched even on foreign ticks
        let gate = self.gate.check(self.tracker.state(), tick.time);

        if tick.symbol != self.active.symbol {
            return skipped(TickSkip::NotActiveSymbol);
        }
        if !self.enabled {
            return skipped(TickSkip::Disabled);
        }
        if !self.pending_liquidation.is_empty() {
            return skipped(TickSkip::Liquidating {
                pending: self.pending_liquidation.clone(),
            });
        }
        if let Err(denial) = gate {
            debug!(?denial, "entry denied");
            return skipped(TickSkip::Denied(denial));
        }

        let open = self.positions.engine_positions(broker, None)?.len();
        if open >= self.config.max_open_positions {
            return skipped(TickSkip::PositionCap { open });
        }

        let timeframe = self.config.stages.get(self.stage).timeframe;
        let snapshot = market.indicator_snapshot(&tick.symbol, timeframe, MIN_SIGNAL_BARS)?;
        if !snapshot.has_enough_bars() {
            debug!(bars = snapshot.bars_available(), "insufficient indicator history");
            return skipped(TickSkip::InsufficientData {
                bars: snapshot.bars_available(),
            });
        }

        let signal = self.signals.evaluate(self.stage, &snapshot, tick.bid, open);
        self.last_signal = Some(signal);
        let Some(direction) = signal.direction else {
            return skipped(TickSkip::NoSignal);
        };

        let info = market.instrument_info(&tick.symbol)?;
        let volume = match self.sizer.size(
            self.tracker.balance(),
            self.config.trade.risk_percent,
            self.config.trade.stop_loss_points,
            &info,
        ) {
            Ok(v) => v,
            Err(e) => {
                warn!(symbol = %tick.symbol, error = %e, "sizing failed");
                return skipped(TickSkip::Sizing(e.to_string()));
            }
        };

        let entry = match direction {
            Direction::Buy => tick.ask,
            Direction::Sell => tick.bid,
        };
        // 0 points leaves the level unset
        let level = |points: f64, sign: f64| {
            if points > 0.0 {
                info.normalize_price(entry + sign * info.points_to_price(points))
            } else {
                0.0
            }
        };
        let request = OrderRequest {
            symbol: tick.symbol.clone(),
            direction,
            volume,
            stop_loss: level(self.config.trade.stop_loss_points, -direction.sign()),
            take_profit: level(self.config.trade.take_profit_points, direction.sign()),
            tag: self.config.order_tag.clone(),
        };

        match broker.place_order(&request) {
            Ok(position_id) => {
                self.gate.record_entry(tick.time);
                info!(
                    position = position_id,
                    symbol = %request.symbol,
                    %direction,
                    volume,
                    strategy = %signal.strategy,
                    "order placed"
                );
                Ok(TickOutcome::Entered {
                    position_id,
                    direction,
                    volume,
                })
            }
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "order rejected");
                skipped(TickSkip::OrderRejected(e.to_string()))
            }
        }
    }
}

fn skipped(reason: TickSkip) -> Result<TickOutcome, StageTraderError> {
    Ok(TickOutcome::Skipped(reason))
}

fn transient_skip(err: StageTraderError) -> Result<TickReport, StageTraderError> {
    if err.is_transient() {
        debug!(error = %err, "tick skipped");
        Ok(TickReport::skipped(TickSkip::Transient(err.to_string())))
    } else {
        Err(err)
    }
}
