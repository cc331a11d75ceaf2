//! Risk-budgeted position sizing.
//!
//! `volume = (balance * risk_percent / 100) / (stop_loss_points * per_point_value)`,
//! then snapped onto the instrument's volume grid `volume_min + k * volume_step`
//! inside `[volume_min, volume_max]`.

use super::instrument::InstrumentInfo;

const VOLUME_DECIMALS: i32 = 8;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SizingError {
    #[error("balance must be positive, got {0}")]
    NonPositiveBalance(f64),

    #[error("risk percent must be positive, got {0}")]
    InvalidRiskPercent(f64),

    #[error("stop-loss distance must be positive, got {0} points")]
    InvalidStopDistance(f64),

    #[error("instrument tick economics are invalid")]
    InvalidInstrument,

    #[error("volume {raw} rounds to zero lots (step {step})")]
    BelowTradableVolume { raw: f64, step: f64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn size(
        &self,
        balance: f64,
        risk_percent: f64,
        stop_loss_points: f64,
        info: &InstrumentInfo,
    ) -> Result<f64, SizingError> {
        if !(balance.is_finite() && balance > 0.0) {
            return Err(SizingError::NonPositiveBalance(balance));
        }
        if !(risk_percent.is_finite() && risk_percent > 0.0) {
            return Err(SizingError::InvalidRiskPercent(risk_percent));
        }
        if !(stop_loss_points.is_finite() && stop_loss_points > 0.0) {
            return Err(SizingError::InvalidStopDistance(stop_loss_points));
        }
        let per_point = info.per_point_value();
        if !info.is_tradable() || !(per_point.is_finite() && per_point > 0.0) {
            return Err(SizingError::InvalidInstrument);
        }

        let risk = balance * risk_percent / 100.0;
        let raw = risk / (stop_loss_points * per_point);
        if (raw / info.volume_step).round() < 1.0 {
            return Err(SizingError::BelowTradableVolume {
                raw,
                step: info.volume_step,
            });
        }

        Ok(snap_to_grid(raw, info))
    }
}

fn snap_to_grid(raw: f64, info: &InstrumentInfo) -> f64 {
    let clamped = raw.clamp(info.volume_min, info.volume_max);
    let max_steps = ((info.volume_max - info.volume_min) / info.volume_step + 1e-9).floor();
    let steps = ((clamped - info.volume_min) / info.volume_step)
        .round()
        .min(max_steps);
    normalize(info.volume_min + steps * info.volume_step)
}

fn normalize(volume: f64) -> f64 {
    let factor = 10f64.powi(VOLUME_DECIMALS);
    (volume * factor).round() / factor
}
