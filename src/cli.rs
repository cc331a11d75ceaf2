//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

use crate::adapters::csv_adapter::CsvBarSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::replay_market::ReplayMarket;
use crate::domain::bar::Timeframe;
use crate::domain::catalog::parse_symbols;
use crate::domain::config::{EngineConfig, StageProfile, StageProfiles, TradeSettings};
use crate::domain::config_validation::validate_engine_config;
use crate::domain::engine::{Engine, EngineSnapshot, EngineStatus};
use crate::domain::error::StageTraderError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::instrument::InstrumentInfo;
use crate::domain::position::ClosedTrade;
use crate::domain::risk_gate::RiskLimits;
use crate::domain::selector::SelectorWeights;
use crate::domain::stage::{Stage, StageThresholds};
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "stagetrader", about = "Balance-staged trading decision engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the stage and candidates for a balance
    Stage {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        balance: f64,
    },
    /// Replay recorded bars against a paper broker
    Paper {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        balance: f64,
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Validate { config } => run_validate(&config),
        Command::Stage { config, balance } => run_stage(&config, balance),
        Command::Paper {
            config,
            data,
            balance,
            snapshot,
        } => run_paper(&config, &data, balance, snapshot.as_ref()),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = StageTraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn symbol_list(
    config: &dyn ConfigPort,
    key: &str,
    default: &[String],
) -> Result<Vec<String>, StageTraderError> {
    match config.get_string("stages", key) {
        Some(raw) => parse_symbols(&raw).map_err(|e| StageTraderError::ConfigInvalid {
            section: "stages".to_string(),
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default.to_vec()),
    }
}

fn timeframe(
    config: &dyn ConfigPort,
    key: &str,
    default: Timeframe,
) -> Result<Timeframe, StageTraderError> {
    match config.get_string("stages", key) {
        Some(raw) => raw.parse().map_err(|reason| StageTraderError::ConfigInvalid {
            section: "stages".to_string(),
            key: key.to_string(),
            reason,
        }),
        None => Ok(default),
    }
}

/// Integer setting converted to the field's type, out-of-range values
/// rejected instead of truncated.
fn count<T: TryFrom<i64>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<T, StageTraderError> {
    let value = config.get_int(section, key, default);
    T::try_from(value).map_err(|_| StageTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("{value} is out of range"),
    })
}

pub fn build_stage_profiles(config: &dyn ConfigPort) -> Result<StageProfiles, StageTraderError> {
    let mut profiles = StageProfiles::default();
    for stage in Stage::ALL {
        let profile = profiles.get_mut(stage);
        *profile = StageProfile {
            symbols: symbol_list(config, &format!("{}_symbols", stage.key()), &profile.symbols)?,
            timeframe: timeframe(
                config,
                &format!("{}_timeframe", stage.key()),
                profile.timeframe,
            )?,
        };
    }
    Ok(profiles)
}

/// Validate every section, then assemble the engine configuration.
pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, StageTraderError> {
    validate_engine_config(config)?;

    let defaults = EngineConfig::default();
    let stages = build_stage_profiles(config)?;
    let thresholds = StageThresholds::new(
        config.get_double("stages", "safer_threshold", defaults.thresholds.safer()),
        config.get_double("stages", "swing_threshold", defaults.thresholds.swing()),
    )?;

    let trade = TradeSettings {
        risk_percent: config.get_double("risk", "risk_percent", defaults.trade.risk_percent),
        stop_loss_points: config.get_double(
            "risk",
            "stop_loss_points",
            defaults.trade.stop_loss_points,
        ),
        take_profit_points: config.get_double(
            "risk",
            "take_profit_points",
            defaults.trade.take_profit_points,
        ),
        trailing_points: config.get_double(
            "risk",
            "trailing_points",
            defaults.trade.trailing_points,
        ),
    };

    let limits = RiskLimits {
        max_drawdown_pct: config.get_double(
            "risk",
            "max_drawdown_pct",
            defaults.limits.max_drawdown_pct,
        ),
        max_consecutive_losses: count(
            config,
            "risk",
            "max_consecutive_losses",
            defaults.limits.max_consecutive_losses.into(),
        )?,
        min_balance: config.get_double("risk", "min_balance", defaults.limits.min_balance),
        max_trades_per_hour: count(
            config,
            "risk",
            "max_trades_per_hour",
            defaults.limits.max_trades_per_hour.into(),
        )?,
        max_daily_loss: config.get_double(
            "risk",
            "max_daily_loss",
            defaults.limits.max_daily_loss,
        ),
        max_trades_per_day: count(
            config,
            "risk",
            "max_trades_per_day",
            defaults.limits.max_trades_per_day.into(),
        )?,
    };

    let d = &defaults.indicators;
    let indicators = IndicatorParams {
        ema_fast: count(config, "indicators", "ema_fast", d.ema_fast as i64)?,
        ema_slow: count(config, "indicators", "ema_slow", d.ema_slow as i64)?,
        rsi_period: count(config, "indicators", "rsi_period", d.rsi_period as i64)?,
        rsi_overbought: config.get_double("indicators", "rsi_overbought", d.rsi_overbought),
        rsi_oversold: config.get_double("indicators", "rsi_oversold", d.rsi_oversold),
        bb_period: count(config, "indicators", "bb_period", d.bb_period as i64)?,
        bb_deviation: config.get_double("indicators", "bb_deviation", d.bb_deviation),
    };

    let w = &defaults.selector;
    let selector = SelectorWeights {
        spread_weight: config.get_double("selector", "spread_weight", w.spread_weight),
        volatility_weight: config.get_double("selector", "volatility_weight", w.volatility_weight),
        major_bonus: config.get_double("selector", "major_bonus", w.major_bonus),
        gold_bonus: config.get_double("selector", "gold_bonus", w.gold_bonus),
    };

    Ok(EngineConfig {
        enabled: config.get_bool("engine", "enabled", defaults.enabled),
        order_tag: config
            .get_string("engine", "order_tag")
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| defaults.order_tag.clone()),
        max_open_positions: count(
            config,
            "engine",
            "max_open_positions",
            defaults.max_open_positions as i64,
        )?,
        rescan_interval_minutes: config.get_int(
            "engine",
            "rescan_interval_minutes",
            defaults.rescan_interval_minutes,
        ),
        volatility_lookback: count(
            config,
            "engine",
            "volatility_lookback",
            defaults.volatility_lookback as i64,
        )?,
        trade,
        limits,
        indicators,
        thresholds,
        stages,
        selector,
    })
}

/// Contract specification from `[instrument:SYMBOL]`. Missing keys fall
/// back to a five-digit forex contract.
pub fn build_instrument_info(config: &dyn ConfigPort, symbol: &str) -> InstrumentInfo {
    let section = format!("instrument:{symbol}");
    let point = config.get_double(&section, "point", 0.00001);
    InstrumentInfo {
        spread: config.get_double(&section, "spread", 10.0),
        point,
        digits: config.get_int(&section, "digits", 5).clamp(0, 10) as u32,
        volume_min: config.get_double(&section, "volume_min", 0.01),
        volume_max: config.get_double(&section, "volume_max", 100.0),
        volume_step: config.get_double(&section, "volume_step", 0.01),
        tick_value: config.get_double(&section, "tick_value", 1.0),
        tick_size: config.get_double(&section, "tick_size", point),
    }
}

/// Every candidate of every stage, in first-seen order.
pub fn all_stage_symbols(config: &EngineConfig) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for stage in Stage::ALL {
        for symbol in &config.stages.get(stage).symbols {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }
    }
    symbols
}

/// Result of a paper run.
#[derive(Debug, Clone, Serialize)]
pub struct PaperRun {
    pub ticks: usize,
    pub entries: usize,
    pub final_balance: f64,
    pub trades: Vec<ClosedTrade>,
    pub snapshot: EngineSnapshot,
}

/// Drive an engine over every recorded bar.
///
/// Ticks before [`ReplayMarket::warmup_end`] only move the market cursor and
/// the broker quotes; the engine starts on the first tick at which every
/// symbol has data. The run stops early if the engine faults.
pub fn run_paper_pipeline(
    config: EngineConfig,
    mut market: ReplayMarket,
    mut broker: PaperBroker,
) -> Result<PaperRun, StageTraderError> {
    let ticks = market.ticks();
    let warmup_end = market
        .warmup_end()
        .ok_or_else(|| StageTraderError::DataUnavailable {
            symbol: market.symbols().join(","),
            reason: "no bars recorded".into(),
        })?;

    let mut engine: Option<Engine> = None;
    let mut processed = 0;
    let mut entries = 0;

    for tick in &ticks {
        market.advance_to(tick.time);
        broker.update_quote(&tick.symbol, tick.bid, tick.ask);
        if tick.time < warmup_end {
            continue;
        }
        if engine.is_none() {
            engine = Some(Engine::start(
                config.clone(),
                &market,
                &mut broker,
                tick.time,
            )?);
        }
        let Some(engine) = engine.as_mut() else {
            continue;
        };

        processed += 1;
        match engine.on_tick(tick, &market, &mut broker) {
            Ok(report) if report.entered() => entries += 1,
            Ok(_) => {}
            Err(e) => {
                error!(time = %tick.time, error = %e, "paper run stopped");
                break;
            }
        }
        if let Err(e) = engine.on_timer(tick.time, &market, &mut broker) {
            error!(time = %tick.time, error = %e, "paper run stopped");
            break;
        }
    }

    let engine = engine.ok_or_else(|| StageTraderError::DataUnavailable {
        symbol: market.symbols().join(","),
        reason: "no ticks after warmup".into(),
    })?;

    Ok(PaperRun {
        ticks: processed,
        entries,
        final_balance: broker.account_balance()?,
        trades: broker.history().to_vec(),
        snapshot: engine.snapshot(),
    })
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nStages:");
    for stage in Stage::ALL {
        let profile = config.stages.get(stage);
        eprintln!(
            "  {:<8} {:<3} {}",
            stage.to_string(),
            profile.timeframe.to_string(),
            profile.symbols.join(", ")
        );
    }
    eprintln!(
        "  thresholds: safer >= {}, swing >= {}",
        config.thresholds.safer(),
        config.thresholds.swing()
    );

    eprintln!("\nRisk:");
    eprintln!("  risk per trade:   {}%", config.trade.risk_percent);
    eprintln!("  stop loss:        {} points", config.trade.stop_loss_points);
    eprintln!("  take profit:      {} points", config.trade.take_profit_points);
    eprintln!("  trailing stop:    {} points", config.trade.trailing_points);
    eprintln!("  max drawdown:     {}%", config.limits.max_drawdown_pct);
    eprintln!("  max loss streak:  {}", config.limits.max_consecutive_losses);

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_stage(config_path: &PathBuf, balance: f64) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let stage = config.thresholds.stage_for(balance);
    let profile = config.stages.get(stage);
    println!("{stage}");
    eprintln!("  timeframe:  {}", profile.timeframe);
    eprintln!("  candidates: {}", profile.symbols.join(", "));
    ExitCode::SUCCESS
}

fn run_paper(
    config_path: &PathBuf,
    data_dir: &PathBuf,
    balance: f64,
    snapshot_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_engine_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 2: Load recorded bars
    let source = CsvBarSource::new(data_dir.clone());
    let mut market = ReplayMarket::new(config.indicators.clone());
    let mut broker = PaperBroker::new(balance);

    for symbol in all_stage_symbols(&config) {
        let bars = match source.load(&symbol) {
            Ok(bars) if bars.is_empty() => {
                warn!(symbol = %symbol, "no recorded bars");
                continue;
            }
            Ok(bars) => bars,
            Err(e) => {
                eprintln!("warning: skipping {} ({})", symbol, e);
                continue;
            }
        };
        let info = build_instrument_info(&adapter, &symbol);
        eprintln!("  {}: {} bars", symbol, bars.len());
        broker.add_instrument(&symbol, info.clone());
        market.insert(&symbol, info, bars);
    }

    if market.symbols().is_empty() {
        eprintln!("error: no recorded bars found in {}", data_dir.display());
        return ExitCode::from(4);
    }

    // Stage 3: Replay
    eprintln!(
        "Running paper replay: {} symbols, starting balance {:.2}",
        market.symbols().len(),
        balance
    );
    let result = match run_paper_pipeline(config, market, broker) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 4: Summary
    let account = &result.snapshot.account;
    eprintln!("\n=== Paper Results ===");
    eprintln!("Ticks:            {}", result.ticks);
    eprintln!("Entries:          {}", result.entries);
    eprintln!("Final Balance:    {:.2}", result.final_balance);
    eprintln!("Peak Balance:     {:.2}", account.peak_balance);
    eprintln!("Closed Trades:    {}", result.trades.len());
    eprintln!("Win Rate:         {:.1}%", result.snapshot.win_rate);
    eprintln!("Stage:            {}", result.snapshot.stage);
    eprintln!("Active Symbol:    {}", result.snapshot.active_symbol);

    let json = match serde_json::to_string_pretty(&result) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("error: failed to serialize snapshot: {e}");
            return ExitCode::from(1);
        }
    };

    match snapshot_path {
        Some(path) => {
            if let Err(e) = fs::write(path, &json) {
                eprintln!("error: failed to write snapshot: {e}");
                return ExitCode::from(1);
            }
            eprintln!("\nSnapshot written to: {}", path.display());
        }
        None => println!("{json}"),
    }

    match result.snapshot.status {
        EngineStatus::Faulted { reason } => {
            eprintln!("error: engine faulted: {reason}");
            ExitCode::from(3)
        }
        _ => ExitCode::SUCCESS,
    }
}
