//! Trailing-stop maintenance and forced liquidation of engine positions.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::StageTraderError;
use super::instrument::InstrumentInfo;
use super::position::Position;
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TrailOutcome {
    Unchanged,
    Moved { from: f64, to: f64 },
    Rejected,
}

/// Result of closing every engine position on one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiquidationReport {
    pub attempted: usize,
    pub closed: usize,
    pub failed: Vec<u64>,
}

impl LiquidationReport {
    pub fn remaining(&self) -> usize {
        self.attempted - self.closed
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionManager {
    trailing_points: f64,
    tag: String,
}

impl PositionManager {
    pub fn new(trailing_points: f64, tag: impl Into<String>) -> Self {
        Self {
            trailing_points,
            tag: tag.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Positions opened by this engine, optionally on one symbol.
    pub fn engine_positions(
        &self,
        broker: &dyn BrokerPort,
        symbol: Option<&str>,
    ) -> Result<Vec<Position>, StageTraderError> {
        Ok(broker
            .open_positions(symbol)?
            .into_iter()
            .filter(|p| p.tag == self.tag)
            .collect())
    }

    /// Tighten the stop of `position` toward `price`; never loosens it.
    pub fn apply_trailing_stop(
        &self,
        broker: &mut dyn BrokerPort,
        position: &Position,
        price: f64,
        info: &InstrumentInfo,
    ) -> TrailOutcome {
        if self.trailing_points <= 0.0 {
            return TrailOutcome::Unchanged;
        }
        let distance = info.points_to_price(self.trailing_points);
        let Some(raw) = position.trailing_candidate(price, distance) else {
            return TrailOutcome::Unchanged;
        };
        let candidate = info.normalize_price(raw);
        let tightens = if position.is_long() {
            candidate > position.stop_loss
        } else {
            !position.has_stop_loss() || candidate < position.stop_loss
        };
        if !tightens {
            return TrailOutcome::Unchanged;
        }

        match broker.modify_stop_loss(position.id, candidate) {
            Ok(()) => {
                debug!(
                    position = position.id,
                    from = position.stop_loss,
                    to = candidate,
                    "trailing stop moved"
                );
                TrailOutcome::Moved {
                    from: position.stop_loss,
                    to: candidate,
                }
            }
            Err(e) => {
                warn!(position = position.id, error = %e, "trailing stop rejected");
                TrailOutcome::Rejected
            }
        }
    }

    /// Trail every engine position on `symbol`. Longs use the bid, shorts
    /// the ask.
    pub fn trail_all(
        &self,
        broker: &mut dyn BrokerPort,
        symbol: &str,
        bid: f64,
        ask: f64,
        info: &InstrumentInfo,
    ) -> Result<Vec<TrailOutcome>, StageTraderError> {
        let positions = self.engine_positions(broker, Some(symbol))?;
        Ok(positions
            .iter()
            .map(|p| {
                let price = if p.is_long() { bid } else { ask };
                self.apply_trailing_stop(broker, p, price, info)
            })
            .collect())
    }

    /// Close every engine position on `symbol`. Safe to call repeatedly.
    pub fn liquidate_all(
        &self,
        broker: &mut dyn BrokerPort,
        symbol: &str,
    ) -> Result<LiquidationReport, StageTraderError> {
        let positions = self.engine_positions(broker, Some(symbol))?;
        let mut report = LiquidationReport {
            attempted: positions.len(),
            ..Default::default()
        };

        for position in &positions {
            match broker.close_position(position.id) {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    warn!(position = position.id, error = %e, "close rejected");
                    report.failed.push(position.id);
                }
            }
        }

        if report.attempted > 0 {
            info!(
                symbol,
                closed = report.closed,
                attempted = report.attempted,
                "liquidation"
            );
        }
        Ok(report)
    }
}
