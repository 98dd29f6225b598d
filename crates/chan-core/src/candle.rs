//! Bar and candle data structures for OHLCV data.

use serde::{Deserialize, Serialize};

/// Raw OHLCV bar as delivered by a data source. May be malformed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: f64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Canonical candle after validation and inclusion merging.
///
/// `index` is the candle's position in the normalized series; every later
/// structure refers to candles by this index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub index: usize,
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Builds a canonical candle at `index` from a single raw bar.
    pub fn from_bar(index: usize, bar: &Bar) -> Self {
        Self {
            index,
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    /// Returns true if this candle's range contains `other`'s range, or the reverse.
    #[inline]
    pub fn is_inclusive_with(&self, high: f64, low: f64) -> bool {
        (high <= self.high && low >= self.low) || (high >= self.high && low <= self.low)
    }

    /// High minus low.
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Trait for types that provide OHLCV data.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_from_bar_keeps_prices() {
        let bar = Bar::new(60.0, 10.0, 12.0, 9.0, 11.0, 500.0);
        let candle = Candle::from_bar(4, &bar);
        assert_eq!(candle.index, 4);
        assert_eq!(candle.timestamp, 60.0);
        assert_eq!(candle.high, 12.0);
        assert_eq!(candle.range(), 3.0);
    }

    #[test]
    fn test_inclusion_both_ways() {
        let candle = Candle::from_bar(0, &Bar::new(0.0, 10.0, 12.0, 8.0, 11.0, 1.0));
        // Inner bar
        assert!(candle.is_inclusive_with(11.0, 9.0));
        // Outer bar
        assert!(candle.is_inclusive_with(13.0, 7.0));
        // Equal range counts as inclusion
        assert!(candle.is_inclusive_with(12.0, 8.0));
        // Higher high and higher low
        assert!(!candle.is_inclusive_with(13.0, 9.0));
    }
}
