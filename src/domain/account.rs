//! Account balance, peak/drawdown tracking and trade statistics.

use serde::Serialize;

use super::position::ClosedTrade;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountState {
    pub balance: f64,
    /// Highest balance ever observed; never decreases.
    pub peak_balance: f64,
    pub drawdown_pct: f64,
    pub consecutive_losses: u32,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub realized_pnl: f64,
}

impl AccountState {
    /// Share of closed trades with positive P&L, in percent.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }
}

pub fn drawdown_pct(peak: f64, balance: f64) -> f64 {
    if peak <= 0.0 {
        return 0.0;
    }
    ((peak - balance) / peak * 100.0).max(0.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTracker {
    state: AccountState,
}

impl AccountTracker {
    pub fn new(initial_balance: f64) -> Self {
        let mut tracker = AccountTracker::default();
        tracker.refresh(initial_balance);
        tracker
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    pub fn balance(&self) -> f64 {
        self.state.balance
    }

    /// Record the latest broker balance, raising the peak if exceeded.
    pub fn refresh(&mut self, balance: f64) {
        self.state.balance = balance;
        if balance > self.state.peak_balance {
            self.state.peak_balance = balance;
        }
        self.state.drawdown_pct = drawdown_pct(self.state.peak_balance, balance);
    }

    /// Classify by realized P&L: a loss extends the streak, anything else
    /// resets it. Break-even trades count toward neither wins nor losses.
    pub fn record_closed_trade(&mut self, trade: &ClosedTrade) {
        let s = &mut self.state;
        s.total_trades += 1;
        s.realized_pnl += trade.pnl;

        if trade.is_loss() {
            s.losing_trades += 1;
            s.consecutive_losses += 1;
            s.consecutive_wins = 0;
            s.max_consecutive_losses = s.max_consecutive_losses.max(s.consecutive_losses);
        } else {
            s.consecutive_losses = 0;
            if trade.is_win() {
                s.winning_trades += 1;
                s.consecutive_wins += 1;
            } else {
                s.consecutive_wins = 0;
            }
        }
    }

    pub fn reset_loss_streak(&mut self) {
        self.state.consecutive_losses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Direction;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            position_id: 1,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            volume: 0.1,
            entry_price: 1.1,
            exit_price: 1.1,
            pnl,
        }
    }

    #[test]
    fn new_tracker_starts_at_peak() {
        let t = AccountTracker::new(1000.0);
        assert_eq!(t.state().peak_balance, 1000.0);
        assert_eq!(t.state().drawdown_pct, 0.0);
    }

    #[test]
    fn drawdown_from_peak() {
        let mut t = AccountTracker::new(1000.0);
        t.refresh(1200.0);
        t.refresh(900.0);
        assert_eq!(t.state().peak_balance, 1200.0);
        assert_relative_eq!(t.state().drawdown_pct, 25.0);
    }

    #[test]
    fn drawdown_with_zero_peak_is_zero() {
        assert_eq!(drawdown_pct(0.0, 0.0), 0.0);
        let t = AccountTracker::new(0.0);
        assert_eq!(t.state().drawdown_pct, 0.0);
    }

    #[test]
    fn loss_streak_and_reset() {
        let mut t = AccountTracker::new(100.0);
        t.record_closed_trade(&trade(-1.0));
        t.record_closed_trade(&trade(-2.0));
        assert_eq!(t.state().consecutive_losses, 2);
        t.record_closed_trade(&trade(3.0));
        assert_eq!(t.state().consecutive_losses, 0);
        assert_eq!(t.state().max_consecutive_losses, 2);
        assert_eq!(t.state().consecutive_wins, 1);
        assert_relative_eq!(t.state().realized_pnl, 0.0);
    }

    #[test]
    fn break_even_resets_streak_without_counting_win() {
        let mut t = AccountTracker::new(100.0);
        t.record_closed_trade(&trade(-1.0));
        t.record_closed_trade(&trade(0.0));
        let s = t.state();
        assert_eq!(s.consecutive_losses, 0);
        assert_eq!(s.winning_trades, 0);
        assert_eq!(s.losing_trades, 1);
        assert_eq!(s.total_trades, 2);
    }

    #[test]
    fn win_rate_percent() {
        let mut t = AccountTracker::new(100.0);
        assert_eq!(t.state().win_rate(), 0.0);
        for pnl in [1.0, -1.0, 2.0, 3.0] {
            t.record_closed_trade(&trade(pnl));
        }
        assert_relative_eq!(t.state().win_rate(), 75.0);
    }

    #[test]
    fn reset_loss_streak_keeps_history() {
        let mut t = AccountTracker::new(100.0);
        t.record_closed_trade(&trade(-1.0));
        t.record_closed_trade(&trade(-1.0));
        t.reset_loss_streak();
        assert_eq!(t.state().consecutive_losses, 0);
        assert_eq!(t.state().max_consecutive_losses, 2);
        assert_eq!(t.state().losing_trades, 2);
    }

    proptest! {
        #[test]
        fn peak_is_non_decreasing(balances in proptest::collection::vec(0.0f64..10_000.0, 1..50)) {
            let mut t = AccountTracker::new(balances[0]);
            let mut last_peak = t.state().peak_balance;
            for b in balances {
                t.refresh(b);
                prop_assert!(t.state().peak_balance >= last_peak);
                prop_assert!(t.state().drawdown_pct >= 0.0);
                last_peak = t.state().peak_balance;
            }
        }
    }
}
