//! Core types for the chan analysis workspace.
//!
//! This crate provides the fundamental data structures shared by every stage:
//! - `Bar` - raw OHLCV input as delivered by a data source
//! - `Candle` - canonical, index-addressed candle produced by normalization
//! - `Timeframe` - sampling granularity enumeration and bar aggregation
//! - `TimeSeries` - container for indicator output

pub mod candle;
pub mod series;
pub mod timeframe;

pub use candle::{Bar, Candle, OHLCV};
pub use series::TimeSeries;
pub use timeframe::{aggregate_bars, Timeframe, UnknownTimeframe};
