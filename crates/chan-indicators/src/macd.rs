//! MACD (Moving Average Convergence Divergence) indicator.

use chan_core::{TimeSeries, OHLCV};
use serde::{Deserialize, Serialize};

use crate::indicator::{Indicator, IndicatorConfig, PriceSource};

/// MACD indicator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdConfig {
    /// Fast EMA period (default: 12).
    pub fast_period: usize,
    /// Slow EMA period (default: 26).
    pub slow_period: usize,
    /// Signal line EMA period (default: 9).
    pub signal_period: usize,
    /// Price source for calculation.
    pub price_source: PriceSource,
    /// Multiplier applied to (MACD - signal). Common charting packages use 2.
    pub histogram_scale: f64,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            price_source: PriceSource::Close,
            histogram_scale: 2.0,
        }
    }
}

impl IndicatorConfig for MacdConfig {}

/// MACD indicator output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdOutput {
    /// MACD line values (fast EMA - slow EMA).
    pub macd_line: TimeSeries<f64>,
    /// Signal line values (EMA of MACD line).
    pub signal_line: TimeSeries<f64>,
    /// Histogram values ((MACD - Signal) * histogram_scale).
    pub histogram: TimeSeries<f64>,
}

/// MACD indicator.
pub struct Macd {
    config: MacdConfig,
}

impl Indicator for Macd {
    type Config = MacdConfig;
    type Output = MacdOutput;

    fn new(config: Self::Config) -> Self {
        Self { config }
    }

    fn calculate<C: OHLCV>(&self, candles: &[C]) -> MacdOutput {
        let prices: Vec<f64> = candles
            .iter()
            .map(|c| self.config.price_source.extract(c))
            .collect();
        self.calculate_prices(&prices)
    }

    fn min_periods(&self) -> usize {
        // slow_period for the first MACD value, then signal_period more for the signal line
        self.config.slow_period + self.config.signal_period - 1
    }

    fn name(&self) -> &str {
        "MACD"
    }
}

impl Macd {
    /// Calculate MACD over a plain price slice.
    pub fn calculate_prices(&self, prices: &[f64]) -> MacdOutput {
        let fast = self.config.fast_period;
        let slow = self.config.slow_period;
        let signal = self.config.signal_period;

        if fast == 0 || slow == 0 || signal == 0 || prices.len() < slow {
            return MacdOutput::default();
        }

        let fast_ema = calculate_ema(prices, fast);
        let slow_ema = calculate_ema(prices, slow);

        // MACD starts where the slow EMA starts
        let macd_start = slow - 1;
        let macd_values: Vec<f64> = (macd_start..prices.len())
            .filter_map(|i| {
                let fast_value = fast_ema.get(i.checked_sub(fast - 1)?)?;
                let slow_value = slow_ema.get(i - macd_start)?;
                Some(fast_value - slow_value)
            })
            .collect();

        let signal_ema = calculate_ema(&macd_values, signal);
        let signal_start = macd_start + signal - 1;

        let histogram: Vec<f64> = signal_ema
            .iter()
            .enumerate()
            .map(|(i, s)| (macd_values[i + signal - 1] - s) * self.config.histogram_scale)
            .collect();

        MacdOutput {
            macd_line: TimeSeries::from_values(&macd_values, macd_start),
            signal_line: TimeSeries::from_values(&signal_ema, signal_start),
            histogram: TimeSeries::from_values(&histogram, signal_start),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MacdConfig {
        &self.config
    }
}

/// Exponential moving average seeded with the SMA of the first `period` prices.
fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.len() < period || period == 0 {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len() - period + 1);

    let mut prev = prices[..period].iter().sum::<f64>() / period as f64;
    ema_values.push(prev);

    for price in &prices[period..] {
        prev += (price - prev) * multiplier;
        ema_values.push(prev);
    }

    ema_values
}
