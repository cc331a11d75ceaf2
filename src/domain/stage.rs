//! Growth stages derived from account balance.
//!
//! A stage is never stored on its own; it is recomputed from the balance and
//! the two configured thresholds every time it is needed.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::StageTraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Scalping,
    Safer,
    Swing,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Scalping, Stage::Safer, Stage::Swing];

    /// Lower-case key used in configuration (`scalping_symbols`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Stage::Scalping => "scalping",
            Stage::Safer => "safer",
            Stage::Swing => "swing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scalping => "Scalping",
            Stage::Safer => "Safer",
            Stage::Swing => "Swing",
        };
        f.write_str(name)
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scalping" => Ok(Stage::Scalping),
            "safer" => Ok(Stage::Safer),
            "swing" => Ok(Stage::Swing),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

/// Balance thresholds T1 < T2 separating the three stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageThresholds {
    safer: f64,
    swing: f64,
}

impl StageThresholds {
    pub fn new(safer: f64, swing: f64) -> Result<Self, StageTraderError> {
        if !(safer.is_finite() && swing.is_finite()) || safer >= swing {
            return Err(StageTraderError::ConfigInvalid {
                section: "stages".to_string(),
                key: "safer_threshold".to_string(),
                reason: format!(
                    "safer_threshold ({safer}) must be below swing_threshold ({swing})"
                ),
            });
        }
        Ok(Self { safer, swing })
    }

    pub fn safer(&self) -> f64 {
        self.safer
    }

    pub fn swing(&self) -> f64 {
        self.swing
    }

    pub fn stage_for(&self, balance: f64) -> Stage {
        current_stage(balance, self)
    }
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            safer: 20.0,
            swing: 100.0,
        }
    }
}

/// balance < T1 → Scalping; T1 ≤ balance < T2 → Safer; balance ≥ T2 → Swing.
pub fn current_stage(balance: f64, thresholds: &StageThresholds) -> Stage {
    if balance < thresholds.safer {
        Stage::Scalping
    } else if balance < thresholds.swing {
        Stage::Safer
    } else {
        Stage::Swing
    }
}

/// A detected change of stage between two evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
}

/// Compare the previous stage with the one implied by `balance`.
pub fn detect_transition(
    previous: Stage,
    balance: f64,
    thresholds: &StageThresholds,
) -> Option<StageTransition> {
    let next = thresholds.stage_for(balance);
    (next != previous).then_some(StageTransition {
        from: previous,
        to: next,
    })
}
