//! Timeframe types and bar aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candle::Bar;

/// Sampling granularity of a bar series.
///
/// Variants are declared finest first, so the derived ordering ranks
/// coarser timeframes as greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Min1,
    Min5,
    Min30,
    Hour1,
    Day1,
    Week1,
    Month1,
}

impl Timeframe {
    /// Returns the duration of this timeframe in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            Timeframe::Min1 => 60.0,
            Timeframe::Min5 => 60.0 * 5.0,
            Timeframe::Min30 => 60.0 * 30.0,
            Timeframe::Hour1 => 60.0 * 60.0,
            Timeframe::Day1 => 60.0 * 60.0 * 24.0,
            Timeframe::Week1 => 60.0 * 60.0 * 24.0 * 7.0,
            Timeframe::Month1 => 60.0 * 60.0 * 24.0 * 30.0,
        }
    }

    /// Returns a short label for this timeframe.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
        }
    }

    /// Returns all available timeframes, finest first.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min30,
            Timeframe::Hour1,
            Timeframe::Day1,
            Timeframe::Week1,
            Timeframe::Month1,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a timeframe label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTimeframe(pub String);

impl fmt::Display for UnknownTimeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeframe label '{}'", self.0)
    }
}

impl std::error::Error for UnknownTimeframe {}

impl FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Timeframe::all()
            .iter()
            .copied()
            .find(|tf| tf.label() == trimmed)
            .ok_or_else(|| UnknownTimeframe(trimmed.to_string()))
    }
}

/// Aggregate bars into a coarser timeframe.
///
/// Buckets are aligned on `floor(timestamp / interval)`; each bucket keeps the
/// first open, the last close, the extreme high/low and the summed volume.
/// Input bars must already be validated and in chronological order.
pub fn aggregate_bars(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    let interval = timeframe.seconds();
    let mut aggregated = Vec::new();
    let mut current: Option<(f64, Bar)> = None;

    for bar in bars {
        let bucket_start = (bar.timestamp / interval).floor() * interval;

        match current.as_mut() {
            Some((start, agg)) if *start == bucket_start => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                if let Some((_, agg)) = current.take() {
                    aggregated.push(agg);
                }
                current = Some((
                    bucket_start,
                    Bar::new(bucket_start, bar.open, bar.high, bar.low, bar.close, bar.volume),
                ));
            }
        }
    }

    if let Some((_, agg)) = current {
        aggregated.push(agg);
    }

    aggregated
}
