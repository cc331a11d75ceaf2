//! CSV bar files for the replay adapters.
//!
//! One file per symbol, `DIR/SYMBOL.csv`, with a header row and columns
//! `time,open,high,low,close[,spread]`. `time` is `%Y-%m-%d %H:%M:%S`; the
//! optional spread is in points.

use crate::domain::bar::Bar;
use crate::domain::error::StageTraderError;
use chrono::NaiveDateTime;
use std::fs;
use std::path::PathBuf;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A bar as recorded, with the spread quoted at its close if present.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBar {
    pub bar: Bar,
    pub spread: Option<f64>,
}

pub struct CsvBarSource {
    base_path: PathBuf,
}

impl CsvBarSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Load every bar of `symbol`, sorted by time.
    pub fn load(&self, symbol: &str) -> Result<Vec<RecordedBar>, StageTraderError> {
        let unavailable = |reason: String| StageTraderError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| unavailable(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| unavailable(format!("CSV parse error: {}", e)))?;
            let row = line + 2;

            let time_str = record
                .get(0)
                .ok_or_else(|| unavailable(format!("row {row}: missing time column")))?;
            let time = NaiveDateTime::parse_from_str(time_str, TIME_FORMAT)
                .map_err(|e| unavailable(format!("row {row}: invalid time: {}", e)))?;

            let column = |idx: usize, name: &str| -> Result<f64, StageTraderError> {
                record
                    .get(idx)
                    .ok_or_else(|| unavailable(format!("row {row}: missing {name} column")))?
                    .parse()
                    .map_err(|e| unavailable(format!("row {row}: invalid {name} value: {}", e)))
            };

            let spread = match record.get(5) {
                Some(s) if !s.is_empty() => Some(column(5, "spread")?),
                _ => None,
            };

            bars.push(RecordedBar {
                bar: Bar {
                    time,
                    open: column(1, "open")?,
                    high: column(2, "high")?,
                    low: column(3, "low")?,
                    close: column(4, "close")?,
                },
                spread,
            });
        }

        bars.sort_by_key(|b| b.bar.time);
        Ok(bars)
    }

    /// Symbols with a CSV file in the directory, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, StageTraderError> {
        let entries = fs::read_dir(&self.base_path)?;
        let mut symbols = Vec::new();

        for entry in entries {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
