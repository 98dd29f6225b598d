//! Core indicator traits and types.

use chan_core::OHLCV;
use serde::{Deserialize, Serialize};

/// Trait for indicator configuration.
pub trait IndicatorConfig: Clone + Default {}

/// Which price to use for indicator calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (High + Low) / 2
    HL2,
    /// (High + Low + Close) / 3
    HLC3,
    /// (Open + High + Low + Close) / 4
    OHLC4,
}

impl PriceSource {
    /// Extract the price from a bar or candle based on this source.
    pub fn extract<C: OHLCV>(&self, candle: &C) -> f64 {
        match self {
            PriceSource::Open => candle.open(),
            PriceSource::High => candle.high(),
            PriceSource::Low => candle.low(),
            PriceSource::Close => candle.close(),
            PriceSource::HL2 => (candle.high() + candle.low()) / 2.0,
            PriceSource::HLC3 => (candle.high() + candle.low() + candle.close()) / 3.0,
            PriceSource::OHLC4 => {
                (candle.open() + candle.high() + candle.low() + candle.close()) / 4.0
            }
        }
    }
}

/// Trait for technical indicators.
pub trait Indicator {
    /// The configuration type for this indicator.
    type Config: IndicatorConfig;
    /// The structured output of one calculation.
    type Output;

    /// Create a new indicator with the given configuration.
    fn new(config: Self::Config) -> Self;

    /// Calculate the indicator values for the given candles.
    fn calculate<C: OHLCV>(&self, candles: &[C]) -> Self::Output;

    /// Minimum number of periods required before the indicator produces valid output.
    fn min_periods(&self) -> usize;

    /// Human-readable name of the indicator.
    fn name(&self) -> &str;
}
