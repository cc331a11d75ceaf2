//! Instrument scoring and selection.
//!
//! ```text
//! score = spread_weight     * (100 / max(spread, EPSILON))
//!       + volatility_weight * volatility_term(stage, volatility)
//!       + major_bonus  if the symbol is a major pair
//!       + gold_bonus   if the stage is Swing and the symbol is gold
//! ```
//!
//! Scalping rewards movement (the volatility term grows with volatility);
//! Safer and Swing reward calm instruments (the term shrinks).

use serde::Serialize;

use crate::domain::catalog::InstrumentCatalog;
use crate::domain::error::StageTraderError;
use crate::domain::instrument::Instrument;
use crate::domain::stage::Stage;

pub const EPSILON: f64 = 0.1;

pub const MAJOR_PAIRS: [&str; 7] = [
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
];

pub const GOLD_SYMBOLS: [&str; 2] = ["XAUUSD", "GOLD"];

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorWeights {
    pub spread_weight: f64,
    pub volatility_weight: f64,
    pub major_bonus: f64,
    pub gold_bonus: f64,
}

impl Default for SelectorWeights {
    fn default() -> Self {
        SelectorWeights {
            spread_weight: 0.5,
            volatility_weight: 0.5,
            major_bonus: 10.0,
            gold_bonus: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub symbol: String,
    pub score: f64,
}

/// Broker symbols often carry suffixes ("EURUSD.m", "XAUUSDpro").
fn matches_root(symbol: &str, roots: &[&str]) -> bool {
    let upper = symbol.to_uppercase();
    roots.iter().any(|root| upper.starts_with(root))
}

pub fn is_major_pair(symbol: &str) -> bool {
    matches_root(symbol, &MAJOR_PAIRS)
}

pub fn is_gold(symbol: &str) -> bool {
    matches_root(symbol, &GOLD_SYMBOLS)
}

pub fn volatility_term(stage: Stage, volatility: f64) -> f64 {
    match stage {
        Stage::Scalping => volatility.max(0.0),
        Stage::Safer | Stage::Swing => 100.0 / volatility.max(EPSILON),
    }
}

pub fn score(instrument: &Instrument, stage: Stage, weights: &SelectorWeights) -> f64 {
    let mut total = weights.spread_weight * (100.0 / instrument.spread.max(EPSILON))
        + weights.volatility_weight * volatility_term(stage, instrument.volatility);
    if is_major_pair(&instrument.symbol) {
        total += weights.major_bonus;
    }
    if stage == Stage::Swing && is_gold(&instrument.symbol) {
        total += weights.gold_bonus;
    }
    total
}

/// Highest-scoring tradable candidate; the first one wins ties.
pub fn select_best(
    catalog: &InstrumentCatalog,
    stage: Stage,
    weights: &SelectorWeights,
) -> Result<Selection, StageTraderError> {
    let mut best: Option<Selection> = None;

    for instrument in catalog.iter().filter(|i| i.tradable) {
        let s = score(instrument, stage, weights);
        if best.as_ref().is_none_or(|b| s > b.score) {
            best = Some(Selection {
                symbol: instrument.symbol.clone(),
                score: s,
            });
        }
    }

    best.ok_or_else(|| StageTraderError::EmptyCatalog {
        stage: stage.to_string(),
    })
}
