//! Circuit breakers on new entries.
//!
//! Drawdown and loss-streak breaches latch the gate into `Halted` until an
//! explicit resume. The balance floor, the hourly trade cap and the daily
//! loss and trade limits deny a single entry without latching. Daily
//! counters restart at midnight of the tick clock.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{info, warn};

use super::account::{AccountState, AccountTracker};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskLimits {
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: u32,
    /// 0 disables the floor.
    pub min_balance: f64,
    /// 0 disables the cap.
    pub max_trades_per_hour: u32,
    /// Realized loss per day in account currency. 0 disables the limit.
    pub max_daily_loss: f64,
    /// 0 disables the cap.
    pub max_trades_per_day: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_drawdown_pct: 20.0,
            max_consecutive_losses: 3,
            min_balance: 0.0,
            max_trades_per_hour: 0,
            max_daily_loss: 0.0,
            max_trades_per_day: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum HaltReason {
    Drawdown { drawdown_pct: f64, limit: f64 },
    LossStreak { losses: u32, limit: u32 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Drawdown {
                drawdown_pct,
                limit,
            } => write!(f, "drawdown {drawdown_pct:.2}% exceeds {limit:.2}%"),
            HaltReason::LossStreak { losses, limit } => {
                write!(f, "{losses} consecutive losses (limit {limit})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GateState {
    Allowed,
    Halted(HaltReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Denial {
    Halted(HaltReason),
    BelowMinBalance { balance: f64, floor: f64 },
    TradeCapReached { trades: usize, limit: u32 },
    DailyLossReached { loss: f64, limit: f64 },
    DailyTradeCapReached { trades: u32, limit: u32 },
}

/// Realized P&L and entries since the start of `day`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DailyTally {
    day: Option<NaiveDate>,
    pnl: f64,
    entries: u32,
}

impl DailyTally {
    fn roll(&mut self, now: NaiveDateTime) {
        let today = now.date();
        if self.day != Some(today) {
            self.day = Some(today);
            self.pnl = 0.0;
            self.entries = 0;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskGate {
    limits: RiskLimits,
    state: GateState,
    recent_entries: VecDeque<NaiveDateTime>,
    daily: DailyTally,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            state: GateState::Allowed,
            recent_entries: VecDeque::new(),
            daily: DailyTally {
                day: None,
                pnl: 0.0,
                entries: 0,
            },
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.state, GateState::Halted(_))
    }

    /// Whether a new entry may be opened now.
    pub fn allow(&mut self, account: &AccountState, now: NaiveDateTime) -> bool {
        self.check(account, now).is_ok()
    }

    /// Like [`allow`](Self::allow) but reports why an entry is denied.
    pub fn check(&mut self, account: &AccountState, now: NaiveDateTime) -> Result<(), Denial> {
        if let GateState::Halted(reason) = self.state {
            return Err(Denial::Halted(reason));
        }

        if let Some(reason) = self.breach(account) {
            warn!(%reason, "risk gate halted");
            self.state = GateState::Halted(reason);
            return Err(Denial::Halted(reason));
        }

        if self.limits.min_balance > 0.0 && account.balance < self.limits.min_balance {
            return Err(Denial::BelowMinBalance {
                balance: account.balance,
                floor: self.limits.min_balance,
            });
        }

        if self.limits.max_trades_per_hour > 0 {
            self.prune(now);
            if self.recent_entries.len() >= self.limits.max_trades_per_hour as usize {
                return Err(Denial::TradeCapReached {
                    trades: self.recent_entries.len(),
                    limit: self.limits.max_trades_per_hour,
                });
            }
        }

        self.daily.roll(now);
        let limit = self.limits.max_daily_loss;
        if limit > 0.0 && self.daily.pnl <= -limit {
            return Err(Denial::DailyLossReached {
                loss: -self.daily.pnl,
                limit,
            });
        }
        let cap = self.limits.max_trades_per_day;
        if cap > 0 && self.daily.entries >= cap {
            return Err(Denial::DailyTradeCapReached {
                trades: self.daily.entries,
                limit: cap,
            });
        }

        Ok(())
    }

    /// Count an entry toward the hourly and daily caps.
    pub fn record_entry(&mut self, now: NaiveDateTime) {
        self.recent_entries.push_back(now);
        self.prune(now);
        self.daily.roll(now);
        self.daily.entries += 1;
    }

    /// Add a closed trade's realized P&L to the day's tally.
    pub fn record_trade_result(&mut self, pnl: f64, now: NaiveDateTime) {
        self.daily.roll(now);
        self.daily.pnl += pnl;
    }

    /// Realized P&L counted toward the daily loss limit.
    pub fn daily_pnl(&self) -> f64 {
        self.daily.pnl
    }

    /// External reset: clear the loss streak and lift the latch. The next
    /// `allow` re-checks drawdown against the current balance.
    pub fn request_resume(&mut self, tracker: &mut AccountTracker) {
        tracker.reset_loss_streak();
        if self.is_halted() {
            info!("risk gate resumed");
        }
        self.state = GateState::Allowed;
    }

    fn breach(&self, account: &AccountState) -> Option<HaltReason> {
        if account.drawdown_pct > self.limits.max_drawdown_pct {
            return Some(HaltReason::Drawdown {
                drawdown_pct: account.drawdown_pct,
                limit: self.limits.max_drawdown_pct,
            });
        }
        if self.limits.max_consecutive_losses > 0
            && account.consecutive_losses >= self.limits.max_consecutive_losses
        {
            return Some(HaltReason::LossStreak {
                losses: account.consecutive_losses,
                limit: self.limits.max_consecutive_losses,
            });
        }
        None
    }

    fn prune(&mut self, now: NaiveDateTime) {
        let cutoff = now - Duration::hours(1);
        while self.recent_entries.front().is_some_and(|t| *t <= cutoff) {
            self.recent_entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ClosedTrade, Direction};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn loss() -> ClosedTrade {
        ClosedTrade {
            position_id: 1,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            volume: 0.1,
            entry_price: 1.1,
            exit_price: 1.09,
            pnl: -1.0,
        }
    }

    #[test]
    fn third_loss_halts() {
        let mut tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits::default());

        tracker.record_closed_trade(&loss());
        assert!(gate.allow(tracker.state(), at(10, 0)));
        tracker.record_closed_trade(&loss());
        assert!(gate.allow(tracker.state(), at(10, 0)));
        tracker.record_closed_trade(&loss());
        assert!(!gate.allow(tracker.state(), at(10, 0)));
        assert!(matches!(
            gate.state(),
            GateState::Halted(HaltReason::LossStreak { losses: 3, limit: 3 })
        ));
    }

    #[test]
    fn drawdown_halt_is_latched() {
        let mut tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits::default());
        tracker.refresh(75.0);
        assert!(!gate.allow(tracker.state(), at(10, 0)));

        // recovery alone does not lift the latch
        tracker.refresh(99.0);
        assert!(!gate.allow(tracker.state(), at(10, 1)));
    }

    #[test]
    fn drawdown_exactly_at_limit_is_allowed() {
        let mut tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits::default());
        tracker.refresh(80.0);
        assert!(gate.allow(tracker.state(), at(10, 0)));
    }

    #[test]
    fn resume_after_loss_streak() {
        let mut tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits::default());
        for _ in 0..3 {
            tracker.record_closed_trade(&loss());
        }
        assert!(!gate.allow(tracker.state(), at(10, 0)));

        gate.request_resume(&mut tracker);
        assert_eq!(tracker.state().consecutive_losses, 0);
        assert!(gate.allow(tracker.state(), at(10, 1)));
    }

    #[test]
    fn resume_rehalts_when_drawdown_still_breached() {
        let mut tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits::default());
        tracker.refresh(70.0);
        assert!(!gate.allow(tracker.state(), at(10, 0)));

        gate.request_resume(&mut tracker);
        assert_eq!(gate.state(), GateState::Allowed);
        assert!(!gate.allow(tracker.state(), at(10, 1)));
        assert!(gate.is_halted());
    }

    #[test]
    fn min_balance_denies_without_latching() {
        let mut tracker = AccountTracker::new(5.0);
        let mut gate = RiskGate::new(RiskLimits {
            min_balance: 10.0,
            ..Default::default()
        });
        assert!(matches!(
            gate.check(tracker.state(), at(10, 0)),
            Err(Denial::BelowMinBalance { .. })
        ));
        assert!(!gate.is_halted());
        tracker.refresh(12.0);
        assert!(gate.allow(tracker.state(), at(10, 1)));
    }

    #[test]
    fn hourly_trade_cap() {
        let tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits {
            max_trades_per_hour: 2,
            ..Default::default()
        });
        gate.record_entry(at(10, 0));
        gate.record_entry(at(10, 30));
        assert!(matches!(
            gate.check(tracker.state(), at(10, 45)),
            Err(Denial::TradeCapReached { trades: 2, limit: 2 })
        ));
        // the 10:00 entry leaves the window at 11:00
        assert!(gate.allow(tracker.state(), at(11, 0)));
        assert!(!gate.is_halted());
    }

    #[test]
    fn daily_loss_limit_resets_next_day() {
        let tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits {
            max_daily_loss: 1.5,
            ..Default::default()
        });
        gate.record_trade_result(-1.0, at(9, 0));
        assert!(gate.allow(tracker.state(), at(9, 5)));
        gate.record_trade_result(0.25, at(9, 10));
        gate.record_trade_result(-0.75, at(9, 20));
        assert!(matches!(
            gate.check(tracker.state(), at(9, 30)),
            Err(Denial::DailyLossReached { limit, .. }) if limit == 1.5
        ));
        assert!(!gate.is_halted());

        let tomorrow = at(9, 30) + Duration::days(1);
        assert!(gate.allow(tracker.state(), tomorrow));
        assert_eq!(gate.daily_pnl(), 0.0);
    }

    #[test]
    fn daily_profit_never_trips_loss_limit() {
        let tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits {
            max_daily_loss: 1.0,
            ..Default::default()
        });
        gate.record_trade_result(5.0, at(9, 0));
        assert!(gate.allow(tracker.state(), at(9, 1)));
    }

    #[test]
    fn daily_trade_cap() {
        let tracker = AccountTracker::new(100.0);
        let mut gate = RiskGate::new(RiskLimits {
            max_trades_per_day: 2,
            ..Default::default()
        });
        gate.record_entry(at(1, 0));
        gate.record_entry(at(12, 0));
        assert!(matches!(
            gate.check(tracker.state(), at(23, 59)),
            Err(Denial::DailyTradeCapReached { trades: 2, limit: 2 })
        ));
        assert!(gate.allow(tracker.state(), at(0, 0) + Duration::days(1)));
    }

    proptest! {
        #[test]
        fn drawdown_halt_is_idempotent(
            drop in 21.0f64..99.0,
            calls in 1usize..20,
        ) {
            let mut tracker = AccountTracker::new(100.0);
            tracker.refresh(100.0 - drop);
            let mut gate = RiskGate::new(RiskLimits::default());
            for i in 0..calls {
                prop_assert!(!gate.allow(tracker.state(), at(10, (i % 60) as u32)));
            }
        }

        #[test]
        fn resume_allows_within_bounds(drop in 0.0f64..20.0) {
            let mut tracker = AccountTracker::new(100.0);
            for _ in 0..3 {
                tracker.record_closed_trade(&loss());
            }
            tracker.refresh(100.0 - drop);
            let mut gate = RiskGate::new(RiskLimits::default());
            prop_assert!(!gate.allow(tracker.state(), at(10, 0)));
            gate.request_resume(&mut tracker);
            prop_assert!(gate.allow(tracker.state(), at(10, 1)));
        }
    }
}
