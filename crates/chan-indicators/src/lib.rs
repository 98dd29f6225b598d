//! Indicator framework for momentum analysis.

pub mod indicator;
pub mod macd;

pub use indicator::{Indicator, IndicatorConfig, PriceSource};
pub use macd::{Macd, MacdConfig, MacdOutput};
