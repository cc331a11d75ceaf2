//! Instrument catalog for the active stage.
//!
//! Parses per-stage symbol lists from configuration and checks each symbol
//! against the market data port before it becomes a selection candidate.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::domain::bar::Timeframe;
use crate::domain::error::StageTraderError;
use crate::domain::instrument::Instrument;
use crate::domain::stage::Stage;
use crate::ports::market_port::MarketDataPort;

/// Timeframe of the bars behind the volatility score.
pub const VOLATILITY_TIMEFRAME: Timeframe = Timeframe::H1;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SymbolListError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SymbolListError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(SymbolListError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    NoContract(String),
    NoHistory,
    NotTradable,
}

/// Candidates for one stage, keyed by symbol, in configured order.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    order: Vec<String>,
    entries: HashMap<String, Instrument>,
    skipped: Vec<SkippedSymbol>,
}

impl InstrumentCatalog {
    /// Build from the stage's candidate list. Fails when nothing is tradable.
    pub fn build(
        market: &dyn MarketDataPort,
        stage: Stage,
        symbols: &[String],
        lookback: usize,
    ) -> Result<Self, StageTraderError> {
        let mut catalog = InstrumentCatalog::default();

        for symbol in symbols {
            match scan_symbol(market, symbol, lookback) {
                Ok(instrument) if instrument.tradable => {
                    debug!(
                        symbol = %symbol,
                        spread = instrument.spread,
                        volatility = instrument.volatility,
                        "catalog candidate"
                    );
                    catalog.order.push(symbol.clone());
                    catalog.entries.insert(symbol.clone(), instrument);
                }
                Ok(_) => catalog.skip(symbol, SkipReason::NotTradable),
                Err(reason) => catalog.skip(symbol, reason),
            }
        }

        if catalog.order.is_empty() {
            return Err(StageTraderError::EmptyCatalog {
                stage: stage.to_string(),
            });
        }

        info!(
            stage = %stage,
            candidates = catalog.order.len(),
            skipped = catalog.skipped.len(),
            "instrument catalog built"
        );
        Ok(catalog)
    }

    /// Re-scan spread and volatility of every entry. Entries that fail the
    /// re-scan are marked untradable rather than removed.
    pub fn refresh(&mut self, market: &dyn MarketDataPort, lookback: usize) {
        for symbol in &self.order {
            let Some(entry) = self.entries.get_mut(symbol) else {
                continue;
            };
            match scan_symbol(market, symbol, lookback) {
                Ok(fresh) => *entry = fresh,
                Err(reason) => {
                    warn!(symbol = %symbol, ?reason, "re-scan failed, marking untradable");
                    entry.tradable = false;
                }
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.entries.get(symbol)
    }

    /// Entries in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.order.iter().filter_map(|s| self.entries.get(s))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedSymbol] {
        &self.skipped
    }

    fn skip(&mut self, symbol: &str, reason: SkipReason) {
        warn!(symbol = %symbol, ?reason, "skipping catalog candidate");
        self.skipped.push(SkippedSymbol {
            symbol: symbol.to_string(),
            reason,
        });
    }
}

impl FromIterator<Instrument> for InstrumentCatalog {
    fn from_iter<I: IntoIterator<Item = Instrument>>(iter: I) -> Self {
        let mut catalog = InstrumentCatalog::default();
        for instrument in iter {
            if catalog.entries.contains_key(&instrument.symbol) {
                continue;
            }
            catalog.order.push(instrument.symbol.clone());
            catalog.entries.insert(instrument.symbol.clone(), instrument);
        }
        catalog
    }
}

fn scan_symbol(
    market: &dyn MarketDataPort,
    symbol: &str,
    lookback: usize,
) -> Result<Instrument, SkipReason> {
    let info = market
        .instrument_info(symbol)
        .map_err(|e| SkipReason::NoContract(e.to_string()))?;
    let history = market
        .price_history(symbol, VOLATILITY_TIMEFRAME, lookback)
        .map_err(|_| SkipReason::NoHistory)?;
    if history.is_empty() {
        return Err(SkipReason::NoHistory);
    }
    Ok(Instrument::new(symbol, info, &history))
}
