//! Engine configuration assembled from the `[engine]`, `[risk]`,
//! `[indicators]`, `[stages]` and `[selector]` sections.

use chrono::Duration;

use super::bar::Timeframe;
use super::indicator::IndicatorParams;
use super::risk_gate::RiskLimits;
use super::selector::SelectorWeights;
use super::signal::RsiThresholds;
use super::stage::{Stage, StageThresholds};

/// Engine positions allowed open at once.
pub const MAX_OPEN_POSITIONS: usize = 2;

/// One week.
pub const MAX_RESCAN_MINUTES: i64 = 7 * 24 * 60;

/// Longest indicator period or volatility lookback, in bars.
pub const MAX_BAR_WINDOW: usize = 10_000;

/// Candidate symbols and signal timeframe of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProfile {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageProfiles {
    pub scalping: StageProfile,
    pub safer: StageProfile,
    pub swing: StageProfile,
}

impl StageProfiles {
    pub fn get(&self, stage: Stage) -> &StageProfile {
        match stage {
            Stage::Scalping => &self.scalping,
            Stage::Safer => &self.safer,
            Stage::Swing => &self.swing,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageProfile {
        match stage {
            Stage::Scalping => &mut self.scalping,
            Stage::Safer => &mut self.safer,
            Stage::Swing => &mut self.swing,
        }
    }
}

impl Default for StageProfiles {
    fn default() -> Self {
        let symbols = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        StageProfiles {
            scalping: StageProfile {
                symbols: symbols(&["EURUSD", "GBPUSD", "USDJPY"]),
                timeframe: Timeframe::M5,
            },
            safer: StageProfile {
                symbols: symbols(&["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"]),
                timeframe: Timeframe::H1,
            },
            swing: StageProfile {
                symbols: symbols(&["XAUUSD", "EURUSD", "GBPUSD"]),
                timeframe: Timeframe::H4,
            },
        }
    }
}

/// Distances are in instrument points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSettings {
    pub risk_percent: f64,
    pub stop_loss_points: f64,
    pub take_profit_points: f64,
    pub trailing_points: f64,
}

impl Default for TradeSettings {
    fn default() -> Self {
        TradeSettings {
            risk_percent: 1.0,
            stop_loss_points: 200.0,
            take_profit_points: 400.0,
            trailing_points: 150.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Whether new entries are allowed right after start.
    pub enabled: bool,
    pub order_tag: String,
    pub max_open_positions: usize,
    pub rescan_interval_minutes: i64,
    pub volatility_lookback: usize,
    pub trade: TradeSettings,
    pub limits: RiskLimits,
    pub indicators: IndicatorParams,
    pub thresholds: StageThresholds,
    pub stages: StageProfiles,
    pub selector: SelectorWeights,
}

impl EngineConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::minutes(self.rescan_interval_minutes.clamp(1, MAX_RESCAN_MINUTES))
    }

    pub fn rsi_thresholds(&self) -> RsiThresholds {
        RsiThresholds {
            overbought: self.indicators.rsi_overbought,
            oversold: self.indicators.rsi_oversold,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            enabled: true,
            order_tag: "stagetrader".to_string(),
            max_open_positions: MAX_OPEN_POSITIONS,
            rescan_interval_minutes: 60,
            volatility_lookback: 24,
            trade: TradeSettings::default(),
            limits: RiskLimits::default(),
            indicators: IndicatorParams::default(),
            thresholds: StageThresholds::default(),
            stages: StageProfiles::default(),
            selector: SelectorWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_open_positions, 2);
        assert_eq!(config.rescan_interval(), Duration::hours(1));
        assert_eq!(config.stages.get(Stage::Swing).timeframe, Timeframe::H4);
        assert_eq!(config.thresholds.stage_for(20.0), Stage::Safer);
    }

    #[test]
    fn rescan_interval_is_clamped() {
        let mut config = EngineConfig::default();
        config.rescan_interval_minutes = i64::MAX;
        assert_eq!(config.rescan_interval(), Duration::weeks(1));
        config.rescan_interval_minutes = 0;
        assert_eq!(config.rescan_interval(), Duration::minutes(1));
    }

    #[test]
    fn rsi_thresholds_follow_indicator_params() {
        let mut config = EngineConfig::default();
        config.indicators.rsi_overbought = 80.0;
        let t = config.rsi_thresholds();
        assert_eq!(t.overbought, 80.0);
        assert_eq!(t.oversold, 30.0);
    }

    #[test]
    fn profiles_are_mutable_per_stage() {
        let mut profiles = StageProfiles::default();
        profiles.get_mut(Stage::Safer).symbols = vec!["NZDUSD".into()];
        assert_eq!(profiles.get(Stage::Safer).symbols, vec!["NZDUSD"]);
        assert_eq!(profiles.get(Stage::Scalping).symbols.len(), 3);
    }
}
