//! In-memory broker for paper runs.
//!
//! Orders fill at the current quote (buys at the ask, sells at the bid).
//! Stops and targets are checked on every quote update in two passes:
//! collect the triggered ids first, then close each one.

use std::collections::HashMap;
use tracing::warn;

use crate::domain::error::StageTraderError;
use crate::domain::instrument::InstrumentInfo;
use crate::domain::position::{ClosedTrade, Direction, OrderRequest, Position};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Quote {
    bid: f64,
    ask: f64,
}

/// Realized P&L in account currency.
pub fn realized_pnl(
    direction: Direction,
    entry_price: f64,
    exit_price: f64,
    volume: f64,
    info: &InstrumentInfo,
) -> f64 {
    if info.tick_size <= 0.0 {
        return 0.0;
    }
    direction.sign() * (exit_price - entry_price) / info.tick_size * info.tick_value * volume
}

pub struct PaperBroker {
    balance: f64,
    next_id: u64,
    instruments: HashMap<String, InstrumentInfo>,
    quotes: HashMap<String, Quote>,
    positions: Vec<Position>,
    unreported: Vec<ClosedTrade>,
    history: Vec<ClosedTrade>,
}

impl PaperBroker {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            next_id: 1,
            instruments: HashMap::new(),
            quotes: HashMap::new(),
            positions: Vec::new(),
            unreported: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn add_instrument(&mut self, symbol: &str, info: InstrumentInfo) {
        self.instruments.insert(symbol.to_string(), info);
    }

    /// Every trade closed so far, oldest first.
    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    /// Record a new quote and close positions whose stop or target it hits.
    /// Returns the number of positions closed. A failed close leaves the
    /// position open and is logged.
    pub fn update_quote(&mut self, symbol: &str, bid: f64, ask: f64) -> usize {
        self.quotes.insert(symbol.to_string(), Quote { bid, ask });

        let triggered: Vec<u64> = self
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .filter(|p| {
                let price = if p.is_long() { bid } else { ask };
                p.should_stop_loss(price) || p.should_take_profit(price)
            })
            .map(|p| p.id)
            .collect();

        let mut closed = 0;
        for id in triggered {
            match self.exit(id) {
                Ok(()) => closed += 1,
                Err(e) => warn!(position = id, %symbol, error = %e, "triggered close failed"),
            }
        }
        closed
    }

    fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).copied()
    }

    fn exit(&mut self, position_id: u64) -> Result<(), StageTraderError> {
        let rejected = |reason: &str| StageTraderError::CloseRejected {
            position_id,
            reason: reason.to_string(),
        };

        let idx = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| rejected("unknown position"))?;
        let symbol = &self.positions[idx].symbol;
        let quote = self.quote(symbol).ok_or_else(|| rejected("no quote"))?;
        let info = self
            .instruments
            .get(symbol)
            .cloned()
            .ok_or_else(|| rejected("unknown instrument"))?;

        let position = self.positions.remove(idx);
        let exit_price = if position.is_long() {
            quote.bid
        } else {
            quote.ask
        };
        let pnl = realized_pnl(
            position.direction,
            position.entry_price,
            exit_price,
            position.volume,
            &info,
        );
        self.balance += pnl;

        let trade = ClosedTrade {
            position_id,
            symbol: position.symbol,
            direction: position.direction,
            volume: position.volume,
            entry_price: position.entry_price,
            exit_price,
            pnl,
        };
        self.unreported.push(trade.clone());
        self.history.push(trade);
        Ok(())
    }
}

impl BrokerPort for PaperBroker {
    fn account_balance(&self) -> Result<f64, StageTraderError> {
        Ok(self.balance)
    }

    fn take_closed_trades(&mut self) -> Vec<ClosedTrade> {
        std::mem::take(&mut self.unreported)
    }

    fn place_order(&mut self, request: &OrderRequest) -> Result<u64, StageTraderError> {
        let rejected = |reason: String| StageTraderError::OrderRejected {
            symbol: request.symbol.clone(),
            reason,
        };

        let info = self
            .instruments
            .get(&request.symbol)
            .ok_or_else(|| rejected("unknown instrument".into()))?;
        let quote = self
            .quote(&request.symbol)
            .ok_or_else(|| rejected("no quote".into()))?;

        if request.volume < info.volume_min || request.volume > info.volume_max {
            return Err(rejected(format!("invalid volume {}", request.volume)));
        }

        let entry_price = match request.direction {
            Direction::Buy => quote.ask,
            Direction::Sell => quote.bid,
        };
        let wrong_side = |level: f64, below: bool| {
            level != 0.0 && if below { level >= entry_price } else { level <= entry_price }
        };
        let is_long = request.direction == Direction::Buy;
        if wrong_side(request.stop_loss, is_long) {
            return Err(rejected(format!("invalid stop {}", request.stop_loss)));
        }
        if wrong_side(request.take_profit, !is_long) {
            return Err(rejected(format!("invalid target {}", request.take_profit)));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.positions.push(Position {
            id,
            symbol: request.symbol.clone(),
            direction: request.direction,
            volume: request.volume,
            entry_price,
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
        let rejected = |reason: String| StageTraderError::ModifyRejected {
            position_id,
            reason,
        };

        let quotes = &self.quotes;
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| rejected("unknown position".into()))?;
        let quote = quotes
            .get(&position.symbol)
            .copied()
            .ok_or_else(|| rejected("no quote".into()))?;

        let crosses_market = if position.is_long() {
            stop_loss >= quote.bid
        } else {
            stop_loss <= quote.ask
        };
        if crosses_market {
            return Err(rejected(format!("stop {stop_loss} crosses the market")));
        }

        position.stop_loss = stop_loss;
        Ok(())
    }

    fn close_position(&mut self, position_id: u64) -> Result<(), StageTraderError> {
        self.exit(position_id)
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn info() -> InstrumentInfo {
        InstrumentInfo {
            spread: 2.0,
            point: 0.0001,
            digits: 4,
            volume_min: 0.01,
            volume_max: 10.0,
            volume_step: 0.01,
            tick_value: 10.0,
            tick_size: 0.0001,
        }
    }

    fn broker() -> PaperBroker {
        let mut b = PaperBroker::new(1000.0);
        b.add_instrument("EURUSD", info());
        b.update_quote("EURUSD", 1.1000, 1.1002);
        b
    }

    fn order(direction: Direction, stop_loss: f64, take_profit: f64) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".into(),
            direction,
            volume: 0.1,
            stop_loss,
            take_profit,
            tag: "stagetrader".into(),
        }
    }

    #[test]
    fn buy_fills_at_ask_sell_at_bid() {
        let mut b = broker();
        let long = b.place_order(&order(Direction::Buy, 0.0, 0.0)).unwrap();
        let short = b.place_order(&order(Direction::Sell, 0.0, 0.0)).unwrap();
        let positions = b.open_positions(None).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions.iter().find(|p| p.id == long).unwrap().entry_price, 1.1002);
        assert_eq!(positions.iter().find(|p| p.id == short).unwrap().entry_price, 1.1000);
    }

    #[test]
    fn close_realizes_pnl() {
        let mut b = broker();
        let id = b.place_order(&order(Direction::Buy, 0.0, 0.0)).unwrap();
        b.update_quote("EURUSD", 1.1022, 1.1024);
        b.close_position(id).unwrap();

        // 20 ticks * 10.0 * 0.1 lots
        assert_relative_eq!(b.account_balance().unwrap(), 1020.0, epsilon = 1e-6);
        let trades = b.take_closed_trades();
        assert_eq!(trades.len(), 1);
        assert!(trades[0].is_win());
        assert!(b.take_closed_trades().is_empty());
        assert_eq!(b.history().len(), 1);
    }

    #[test]
    fn stop_loss_triggers_on_quote() {
        let mut b = broker();
        b.place_order(&order(Direction::Buy, 1.0990, 1.1050)).unwrap();
        assert_eq!(b.update_quote("EURUSD", 1.0995, 1.0997), 0);
        assert_eq!(b.update_quote("EURUSD", 1.0989, 1.0991), 1);
        let trades = b.take_closed_trades();
        assert!(trades[0].is_loss());
        assert_eq!(trades[0].exit_price, 1.0989);
        assert!(b.open_positions(None).unwrap().is_empty());
    }

    #[test]
    fn failed_trigger_keeps_position_open() {
        let mut b = broker();
        let id = b.place_order(&order(Direction::Buy, 1.0990, 0.0)).unwrap();
        b.instruments.clear();
        assert_eq!(b.update_quote("EURUSD", 1.0980, 1.0982), 0);
        let open = b.open_positions(None).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert!(b.take_closed_trades().is_empty());
        assert!(b.history().is_empty());
    }

    #[test]
    fn short_take_profit_uses_ask() {
        let mut b = broker();
        b.place_order(&order(Direction::Sell, 1.1050, 1.0950)).unwrap();
        assert_eq!(b.update_quote("EURUSD", 1.0949, 1.0951), 0);
        assert_eq!(b.update_quote("EURUSD", 1.0948, 1.0950), 1);
    }

    #[test]
    fn rejects_invalid_orders() {
        let mut b = broker();
        let mut big = order(Direction::Buy, 0.0, 0.0);
        big.volume = 50.0;
        assert!(matches!(
            b.place_order(&big),
            Err(StageTraderError::OrderRejected { .. })
        ));
        assert!(b.place_order(&order(Direction::Buy, 1.1010, 0.0)).is_err());
        assert!(b.place_order(&order(Direction::Sell, 0.0, 1.1010)).is_err());

        let mut unknown = order(Direction::Buy, 0.0, 0.0);
        unknown.symbol = "GBPUSD".into();
        assert!(b.place_order(&unknown).is_err());
    }

    #[test]
    fn modify_rejects_stop_through_market() {
        let mut b = broker();
        let id = b.place_order(&order(Direction::Buy, 1.0990, 0.0)).unwrap();
        assert!(b.modify_stop_loss(id, 1.0995).is_ok());
        assert!(matches!(
            b.modify_stop_loss(id, 1.1001),
            Err(StageTraderError::ModifyRejected { .. })
        ));
        assert!(b.modify_stop_loss(99, 1.0).is_err());
    }

    #[test]
    fn close_unknown_position_is_rejected() {
        let mut b = broker();
        assert!(matches!(
            b.close_position(7),
            Err(StageTraderError::CloseRejected { position_id: 7, .. })
        ));
    }

    #[test]
    fn open_positions_filters_by_symbol() {
        let mut b = broker();
        b.add_instrument("GBPUSD", info());
        b.update_quote("GBPUSD", 1.2700, 1.2702);
        b.place_order(&order(Direction::Buy, 0.0, 0.0)).unwrap();
        let mut gbp = order(Direction::Buy, 0.0, 0.0);
        gbp.symbol = "GBPUSD".into();
        b.place_order(&gbp).unwrap();
        assert_eq!(b.open_positions(Some("GBPUSD")).unwrap().len(), 1);
        assert_eq!(b.open_positions(None).unwrap().len(), 2);
    }
}
