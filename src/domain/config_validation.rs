//! Configuration validation.
//!
//! Validates every engine field before an engine is built.

use crate::domain::bar::Timeframe;
use crate::domain::catalog::parse_symbols;
use crate::domain::config::{MAX_BAR_WINDOW, MAX_OPEN_POSITIONS, MAX_RESCAN_MINUTES};
use crate::domain::error::StageTraderError;
use crate::domain::stage::{Stage, StageThresholds};
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    validate_engine_section(config)?;
    validate_risk(config)?;
    validate_indicators(config)?;
    validate_stages(config)?;
    validate_selector(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StageTraderError {
    StageTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, StageTraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

fn parse_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<i64>, StageTraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{raw}' is not an integer"))),
    }
}

fn required_double(config: &dyn ConfigPort, section: &str, key: &str) -> Result<f64, StageTraderError> {
    parse_double(config, section, key)?.ok_or_else(|| StageTraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, StageTraderError> {
    Ok(parse_double(config, section, key)?.unwrap_or(default))
}

fn optional_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, StageTraderError> {
    Ok(parse_int(config, section, key)?.unwrap_or(default))
}

/// Integer in `min..=max`, or `default` when the key is absent.
fn bounded_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, StageTraderError> {
    let value = optional_int(config, section, key, default)?;
    if value < min || value > max {
        return Err(invalid(
            section,
            key,
            format!("{key} must be between {min} and {max}"),
        ));
    }
    Ok(value)
}

fn validate_engine_section(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    if let Some(tag) = config.get_string("engine", "order_tag") {
        if tag.trim().is_empty() {
            return Err(invalid("engine", "order_tag", "order_tag must not be empty"));
        }
    }
    if let Some(raw) = config.get_string("engine", "enabled") {
        let known = ["true", "false", "yes", "no", "1", "0"];
        if !known.contains(&raw.trim().to_lowercase().as_str()) {
            return Err(invalid("engine", "enabled", format!("'{raw}' is not a boolean")));
        }
    }
    for (key, default, max) in [
        ("max_open_positions", 2, MAX_OPEN_POSITIONS as i64),
        ("rescan_interval_minutes", 60, MAX_RESCAN_MINUTES),
        ("volatility_lookback", 24, MAX_BAR_WINDOW as i64),
    ] {
        bounded_int(config, "engine", key, default, 1, max)?;
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    let risk = required_double(config, "risk", "risk_percent")?;
    if risk <= 0.0 || risk > 100.0 {
        return Err(invalid("risk", "risk_percent", "risk_percent must be in (0, 100]"));
    }

    let stop = required_double(config, "risk", "stop_loss_points")?;
    if stop <= 0.0 {
        return Err(invalid(
            "risk",
            "stop_loss_points",
            "stop_loss_points must be positive",
        ));
    }

    for key in [
        "take_profit_points",
        "trailing_points",
        "min_balance",
        "max_daily_loss",
    ] {
        if optional_double(config, "risk", key, 0.0)? < 0.0 {
            return Err(invalid("risk", key, format!("{key} must be non-negative")));
        }
    }

    let drawdown = required_double(config, "risk", "max_drawdown_pct")?;
    if drawdown <= 0.0 || drawdown > 100.0 {
        return Err(invalid(
            "risk",
            "max_drawdown_pct",
            "max_drawdown_pct must be in (0, 100]",
        ));
    }

    if parse_int(config, "risk", "max_consecutive_losses")?.is_none() {
        return Err(StageTraderError::ConfigMissing {
            section: "risk".to_string(),
            key: "max_consecutive_losses".to_string(),
        });
    }
    bounded_int(config, "risk", "max_consecutive_losses", 0, 1, u32::MAX.into())?;

    for key in ["max_trades_per_hour", "max_trades_per_day"] {
        bounded_int(config, "risk", key, 0, 0, u32::MAX.into())?;
    }
    Ok(())
}

fn validate_indicators(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    let window = MAX_BAR_WINDOW as i64;
    let fast = bounded_int(config, "indicators", "ema_fast", 9, 1, window)?;
    let slow = bounded_int(config, "indicators", "ema_slow", 21, 1, window)?;
    bounded_int(config, "indicators", "rsi_period", 14, 1, window)?;
    bounded_int(config, "indicators", "bb_period", 20, 1, window)?;
    if fast >= slow {
        return Err(invalid(
            "indicators",
            "ema_fast",
            "ema_fast must be shorter than ema_slow",
        ));
    }

    let overbought = optional_double(config, "indicators", "rsi_overbought", 70.0)?;
    let oversold = optional_double(config, "indicators", "rsi_oversold", 30.0)?;
    if !(0.0 < oversold && oversold < 50.0) {
        return Err(invalid(
            "indicators",
            "rsi_oversold",
            "rsi_oversold must be between 0 and 50",
        ));
    }
    if !(50.0 < overbought && overbought < 100.0) {
        return Err(invalid(
            "indicators",
            "rsi_overbought",
            "rsi_overbought must be between 50 and 100",
        ));
    }

    if optional_double(config, "indicators", "bb_deviation", 2.0)? <= 0.0 {
        return Err(invalid(
            "indicators",
            "bb_deviation",
            "bb_deviation must be positive",
        ));
    }
    Ok(())
}

fn validate_stages(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    let safer = required_double(config, "stages", "safer_threshold")?;
    let swing = required_double(config, "stages", "swing_threshold")?;
    if safer <= 0.0 {
        return Err(invalid(
            "stages",
            "safer_threshold",
            "safer_threshold must be positive",
        ));
    }
    StageThresholds::new(safer, swing)?;

    for stage in Stage::ALL {
        let key = format!("{}_symbols", stage.key());
        let raw = config
            .get_string("stages", &key)
            .ok_or_else(|| StageTraderError::ConfigMissing {
                section: "stages".to_string(),
                key: key.clone(),
            })?;
        parse_symbols(&raw).map_err(|e| invalid("stages", &key, e.to_string()))?;

        let key = format!("{}_timeframe", stage.key());
        if let Some(raw) = config.get_string("stages", &key) {
            raw.parse::<Timeframe>()
                .map_err(|e| invalid("stages", &key, e))?;
        }
    }
    Ok(())
}

fn validate_selector(config: &dyn ConfigPort) -> Result<(), StageTraderError> {
    for (key, default) in [
        ("spread_weight", 0.5),
        ("volatility_weight", 0.5),
        ("major_bonus", 10.0),
        ("gold_bonus", 15.0),
    ] {
        if optional_double(config, "selector", key, default)? < 0.0 {
            return Err(invalid("selector", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}
