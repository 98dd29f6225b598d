//! Data loading utilities for chan.

pub mod csv;
pub mod source;

pub use self::csv::{
    analyze_data_gaps, is_chronological, load_bars_from_csv, parse_datetime, CsvLoader,
    GapReport,
};
pub use source::DataSource;
