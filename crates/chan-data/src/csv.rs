//! CSV data loading implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chan_core::Bar;

use crate::DataSource;

/// Loads bar data from CSV files.
pub struct CsvLoader {
    path: PathBuf,
}

impl CsvLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataSource for CsvLoader {
    fn load(&self) -> anyhow::Result<Vec<Bar>> {
        load_bars_from_csv(&self.path)
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Parse a Unix timestamp, "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS" or
/// "YYYY-MM-DD" into Unix seconds (UTC).
pub fn parse_datetime(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<f64>() {
        return Some(ts);
    }

    let parts: Vec<&str> = s.split(&['-', ' ', 'T', ':']).collect();
    if parts.len() != 3 && parts.len() < 6 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: usize = parts[1].parse().ok()?;
    let day: i64 = parts[2].parse().ok()?;
    let (hour, min, sec): (i64, i64, i64) = if parts.len() >= 6 {
        (
            parts[3].parse().ok()?,
            parts[4].parse().ok()?,
            parts[5].parse().ok()?,
        )
    } else {
        (0, 0, 0)
    };
    if year < 1970 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    // Days since Unix epoch (1970-01-01)
    let mut days: i64 = (1970..year)
        .map(|y| if is_leap_year(y) { 366 } else { 365 })
        .sum();
    let month_days = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    days += month_days[month - 1];
    if month > 2 && is_leap_year(year) {
        days += 1;
    }
    days += day - 1;

    let timestamp = days * 86400 + hour * 3600 + min * 60 + sec;
    Some(timestamp as f64)
}

/// Load bars from a CSV file with a header row.
///
/// Columns are located by name (`timestamp`/`time`/`date`, `open`, `high`,
/// `low`, `close`, `volume`), falling back to positions 0 to 5. Millisecond
/// timestamps are converted to seconds. Out-of-order rows are logged and
/// sorted; integrity checks are left to the analyzer.
pub fn load_bars_from_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let headers_lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let column = |names: &[&str], fallback: usize| {
        headers_lower
            .iter()
            .position(|h| names.contains(&h.as_str()))
            .unwrap_or(fallback)
    };

    // Headers like "Unix Timestamp" count as the time column
    let ts_col = headers_lower
        .iter()
        .position(|h| h.contains("timestamp"))
        .unwrap_or_else(|| column(&["time", "date", "datetime"], 0));
    let open_col = column(&["open"], 1);
    let high_col = column(&["high"], 2);
    let low_col = column(&["low"], 3);
    let close_col = column(&["close"], 4);
    let volume_col = column(&["volume"], 5);

    let mut bars = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("row {}", row + 1))?;
        let field = |col: usize| record.get(col).unwrap_or("0");
        let number = |col: usize| -> anyhow::Result<f64> {
            field(col)
                .parse::<f64>()
                .with_context(|| format!("row {}: bad number '{}'", row + 1, field(col)))
        };

        let mut timestamp = parse_datetime(field(ts_col))
            .with_context(|| format!("row {}: bad timestamp '{}'", row + 1, field(ts_col)))?;
        // Detect milliseconds (13+ digits) vs seconds (10 digits)
        if timestamp > 1e12 {
            timestamp /= 1000.0;
        }

        bars.push(Bar::new(
            timestamp,
            number(open_col)?,
            number(high_col)?,
            number(low_col)?,
            number(close_col)?,
            number(volume_col)?,
        ));
    }

    if !is_chronological(&bars) {
        log::warn!(
            "{}: rows are not in chronological order, sorting them",
            path.display()
        );
        bars.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    let timestamps: Vec<f64> = bars.iter().map(|b| b.timestamp).collect();
    analyze_data_gaps(&timestamps);
    log::info!("loaded {} bars from {}", bars.len(), path.display());

    Ok(bars)
}

/// True if no bar is earlier than the one before it. Repeated timestamps
/// are left for the analyzer to reject.
pub fn is_chronological(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Summary of gaps in a timestamp series.
#[derive(Debug, Clone, PartialEq)]
pub struct GapReport {
    pub points: usize,
    /// Most common spacing between consecutive points, in seconds.
    pub expected_interval: i64,
    pub gaps: usize,
    pub missing_points: i64,
    pub largest_gap: i64,
    pub largest_gap_start: f64,
}

/// Analyze data for gaps and missing data points.
///
/// Returns `None` when there are fewer than two points.
pub fn analyze_data_gaps(timestamps: &[f64]) -> Option<GapReport> {
    if timestamps.len() < 2 {
        log::debug!("not enough data points to analyze gaps");
        return None;
    }

    let mut intervals: HashMap<i64, usize> = HashMap::new();
    for window in timestamps.windows(2) {
        let diff = (window[1] - window[0]).round() as i64;
        *intervals.entry(diff).or_insert(0) += 1;
    }

    // Most common positive interval; smallest wins a tie
    let expected_interval = intervals
        .iter()
        .filter(|(interval, _)| **interval > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(interval, _)| *interval)
        .unwrap_or(60);

    let mut report = GapReport {
        points: timestamps.len(),
        expected_interval,
        gaps: 0,
        missing_points: 0,
        largest_gap: 0,
        largest_gap_start: 0.0,
    };

    for window in timestamps.windows(2) {
        let diff = (window[1] - window[0]).round() as i64;
        if diff > expected_interval {
            report.gaps += 1;
            report.missing_points += diff / expected_interval - 1;
            if diff > report.largest_gap {
                report.largest_gap = diff;
                report.largest_gap_start = window[0];
            }
        }
    }

    let span = timestamps[timestamps.len() - 1] - timestamps[0];
    log::info!(
        "{} points over {:.1} days, interval {}s, {} gaps, {} missing points",
        report.points,
        span / 86400.0,
        report.expected_interval,
        report.gaps,
        report.missing_points
    );
    if report.largest_gap > 0 {
        log::info!(
            "largest gap: {:.1} hours at timestamp {}",
            report.largest_gap as f64 / 3600.0,
            report.largest_gap_start
        );
    }

    Some(report)
}
