//! Price bars, quotes and timeframes.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Chart timeframe used when requesting history or indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Start of the bucket of this timeframe that contains `time`.
    pub fn bucket_start(self, time: NaiveDateTime) -> NaiveDateTime {
        let minutes = self.minutes();
        let minute_of_day = i64::from(time.hour()) * 60 + i64::from(time.minute());
        let offset = minute_of_day % minutes;
        let floored = time
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(time);
        floored - chrono::Duration::minutes(offset)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(name)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

/// Aggregate time-ordered bars into buckets of `timeframe`, appending to an
/// already resampled series. The first new bar merges into the last bucket
/// of `out` when they share a bucket.
pub fn resample_into<'a>(
    out: &mut Vec<Bar>,
    bars: impl IntoIterator<Item = &'a Bar>,
    timeframe: Timeframe,
) {
    for bar in bars {
        let bucket = timeframe.bucket_start(bar.time);
        match out.last_mut() {
            Some(last) if last.time == bucket => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
            }
            _ => out.push(Bar {
                time: bucket,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            }),
        }
    }
}

/// A price update for one symbol; one decision cycle runs per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub time: NaiveDateTime,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}
