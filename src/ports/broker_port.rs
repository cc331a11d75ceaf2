//! Broker port: account balance, order placement and position management.

use crate::domain::error::StageTraderError;
use crate::domain::position::{ClosedTrade, OrderRequest, Position};

pub trait BrokerPort {
    fn account_balance(&self) -> Result<f64, StageTraderError>;

    /// Trades closed since the previous call, with their realized P&L.
    fn take_closed_trades(&mut self) -> Vec<ClosedTrade>;

    /// Place a market order; returns the id of the opened position.
    fn place_order(&mut self, request: &OrderRequest) -> Result<u64, StageTraderError>;

    fn modify_stop_loss(&mut self, position_id: u64, stop_loss: f64)
    -> Result<(), StageTraderError>;

    fn close_position(&mut self, position_id: u64) -> Result<(), StageTraderError>;

    /// Open positions, optionally restricted to one symbol.
    fn open_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>, StageTraderError>;
}
