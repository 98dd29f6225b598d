//! Bar validation and inclusion merging.
//!
//! Raw bars become canonical candles here. Bars that fail validation are
//! excluded and recorded; they never reach a later stage. Each canonical
//! candle remembers which raw bars it absorbed.

use chan_core::{Bar, Candle};
use serde::{Deserialize, Serialize};

use crate::error::IntegrityViolation;
use crate::types::Direction;

/// A raw bar that was dropped during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarExclusion {
    /// Position of the bar in the raw input.
    pub raw_index: usize,
    pub timestamp: f64,
    pub violation: IntegrityViolation,
}

/// Canonical candle series with back-references into the raw input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub candles: Vec<Candle>,
    /// Raw bar indices absorbed by each candle, parallel to `candles`.
    pub sources: Vec<Vec<usize>>,
    pub exclusions: Vec<BarExclusion>,
    /// Number of raw bars seen.
    pub raw_count: usize,
    /// Size of the finer series the raw bars were aggregated from, if any.
    /// Inherited exclusions index into that series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    /// Timestamp of the candle at `index`.
    pub fn timestamp_of(&self, index: usize) -> Option<f64> {
        self.candles.get(index).map(|c| c.timestamp)
    }

    /// Raw bar indices merged into the candle at `index`.
    pub fn raw_indices(&self, index: usize) -> &[usize] {
        self.sources.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of raw bars absorbed by inclusion merging.
    pub fn merged_count(&self) -> usize {
        self.sources.iter().map(|s| s.len().saturating_sub(1)).sum()
    }

    /// Fraction of input bars excluded for integrity violations.
    ///
    /// Measured against the source series when the input was aggregated.
    pub fn exclusion_ratio(&self) -> f64 {
        let total = self.source_count.unwrap_or(self.raw_count);
        if total == 0 {
            return 0.0;
        }
        self.exclusions.len() as f64 / total as f64
    }

    /// Record bars excluded before aggregation, ahead of this series' own.
    pub fn inherit_exclusions(&mut self, exclusions: &[BarExclusion], source_count: usize) {
        self.exclusions.splice(0..0, exclusions.iter().copied());
        self.source_count = Some(source_count);
    }
}

/// Check a bar for integrity violations.
///
/// `previous_timestamp` is the timestamp of the last accepted bar.
pub fn validate_bar(bar: &Bar, previous_timestamp: Option<f64>) -> Result<(), IntegrityViolation> {
    let values = [bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(IntegrityViolation::NonFinite);
    }
    if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
        return Err(IntegrityViolation::NonPositivePrice);
    }
    if bar.volume < 0.0 {
        return Err(IntegrityViolation::NegativeVolume(bar.volume));
    }
    if bar.high < bar.low {
        return Err(IntegrityViolation::HighBelowLow {
            high: bar.high,
            low: bar.low,
        });
    }
    if let Some(previous) = previous_timestamp {
        if bar.timestamp <= previous {
            return Err(IntegrityViolation::NonIncreasingTimestamp {
                timestamp: bar.timestamp,
                previous,
            });
        }
    }
    Ok(())
}

/// Incremental normalizer. Feed raw bars in order, then call `finalize`.
#[derive(Debug, Default)]
pub struct Normalizer {
    inclusion_merge: bool,
    series: NormalizedSeries,
    last_timestamp: Option<f64>,
}

impl Normalizer {
    pub fn new(inclusion_merge: bool) -> Self {
        Self {
            inclusion_merge,
            series: NormalizedSeries::default(),
            last_timestamp: None,
        }
    }

    /// Process one raw bar.
    ///
    /// Returns the canonical index the bar landed in, or `None` if it was excluded.
    pub fn process(&mut self, raw_index: usize, bar: &Bar) -> Option<usize> {
        self.series.raw_count += 1;

        if let Err(violation) = validate_bar(bar, self.last_timestamp) {
            log::warn!("excluding bar {raw_index} at {}: {violation}", bar.timestamp);
            self.series.exclusions.push(BarExclusion {
                raw_index,
                timestamp: bar.timestamp,
                violation,
            });
            return None;
        }
        self.last_timestamp = Some(bar.timestamp);

        if self.inclusion_merge {
            let direction = self.prevailing_direction();
            if let Some(last) = self.series.candles.last_mut() {
                if last.is_inclusive_with(bar.high, bar.low) {
                    match direction {
                        Direction::Up => {
                            last.high = last.high.max(bar.high);
                            last.low = last.low.max(bar.low);
                        }
                        Direction::Down => {
                            last.high = last.high.min(bar.high);
                            last.low = last.low.min(bar.low);
                        }
                    }
                    last.close = bar.close;
                    last.volume += bar.volume;
                    let index = last.index;
                    if let Some(sources) = self.series.sources.last_mut() {
                        sources.push(raw_index);
                    }
                    return Some(index);
                }
            }
        }

        let index = self.series.candles.len();
        self.series.candles.push(Candle::from_bar(index, bar));
        self.series.sources.push(vec![raw_index]);
        Some(index)
    }

    /// Trend of the unmerged triplet formed by the last two canonical candles
    /// and the incoming bar: down if the later candle has the lower high, else
    /// up. A series with fewer than two candles counts as up.
    fn prevailing_direction(&self) -> Direction {
        match self.series.candles.as_slice() {
            [.., prev, last] if last.high < prev.high => Direction::Down,
            _ => Direction::Up,
        }
    }

    /// Number of canonical candles so far.
    pub fn len(&self) -> usize {
        self.series.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.candles.is_empty()
    }

    pub fn finalize(self) -> NormalizedSeries {
        self.series
    }
}

/// Normalize a slice of raw bars.
pub fn normalize_bars(bars: &[Bar], inclusion_merge: bool) -> NormalizedSeries {
    let mut normalizer = Normalizer::new(inclusion_merge);
    for (i, bar) in bars.iter().enumerate() {
        normalizer.process(i, bar);
    }
    normalizer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(time: f64, high: f64, low: f64) -> Bar {
        Bar::new(time, low, high, low, high, 10.0)
    }

    #[test]
    fn test_no_inclusion_keeps_all_bars() {
        let bars = vec![
            make_bar(0.0, 10.0, 8.0),
            make_bar(1.0, 11.0, 9.0),
            make_bar(2.0, 12.0, 10.0),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 3);
        assert_eq!(series.raw_indices(1), &[1]);
        assert_eq!(series.merged_count(), 0);
    }

    #[test]
    fn test_inclusion_in_uptrend_takes_higher_extremes() {
        let bars = vec![
            make_bar(0.0, 10.0, 8.0),
            make_bar(1.0, 12.0, 9.0),
            // Contained in the previous bar
            make_bar(2.0, 11.5, 9.5),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 2);
        let merged = series.candles[1];
        assert_eq!(merged.high, 12.0);
        assert_eq!(merged.low, 9.5);
        assert_eq!(merged.timestamp, 1.0);
        assert_eq!(merged.volume, 20.0);
        assert_eq!(series.raw_indices(1), &[1, 2]);
    }

    #[test]
    fn test_inclusion_in_downtrend_takes_lower_extremes() {
        let bars = vec![
            make_bar(0.0, 12.0, 10.0),
            make_bar(1.0, 11.0, 8.0),
            // Contains the previous bar
            make_bar(2.0, 11.5, 7.0),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles[1].high, 11.0);
        assert_eq!(series.candles[1].low, 7.0);
    }

    #[test]
    fn test_chained_merges_keep_the_triplet_direction() {
        let bars = vec![
            make_bar(0.0, 10.0, 8.0),
            make_bar(1.0, 12.0, 9.0),
            make_bar(2.0, 11.5, 9.5),
            // Still inside the merged candle; candle 0 vs candle 1 is still up
            make_bar(3.0, 11.9, 9.6),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles[1].high, 12.0);
        assert_eq!(series.candles[1].low, 9.6);
        assert_eq!(series.raw_indices(1), &[1, 2, 3]);
    }

    #[test]
    fn test_merge_at_series_start_counts_as_up() {
        let bars = vec![make_bar(0.0, 12.0, 8.0), make_bar(1.0, 11.0, 9.0)];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 1);
        assert_eq!(series.candles[0].high, 12.0);
        assert_eq!(series.candles[0].low, 9.0);
    }

    #[test]
    fn test_merge_disabled() {
        let bars = vec![
            make_bar(0.0, 10.0, 8.0),
            make_bar(1.0, 12.0, 9.0),
            make_bar(2.0, 11.5, 9.5),
        ];
        let series = normalize_bars(&bars, false);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_malformed_bar_excluded() {
        let bars = vec![
            make_bar(0.0, 10.0, 8.0),
            // high < low
            Bar::new(1.0, 9.0, 7.0, 9.5, 8.0, 1.0),
            make_bar(2.0, 11.0, 9.0),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 2);
        assert_eq!(series.exclusions.len(), 1);
        assert_eq!(series.exclusions[0].raw_index, 1);
        assert!(matches!(
            series.exclusions[0].violation,
            IntegrityViolation::HighBelowLow { .. }
        ));
        assert!(series.sources.iter().all(|s| !s.contains(&1)));
        assert_eq!(series.raw_count, 3);
    }

    #[test]
    fn test_non_increasing_timestamp_excluded() {
        let bars = vec![
            make_bar(5.0, 10.0, 8.0),
            make_bar(5.0, 11.0, 9.0),
            make_bar(4.0, 12.0, 10.0),
            make_bar(6.0, 12.0, 10.0),
        ];
        let series = normalize_bars(&bars, true);
        assert_eq!(series.len(), 2);
        assert_eq!(series.exclusions.len(), 2);
        assert!(series
            .exclusions
            .iter()
            .all(|e| matches!(e.violation, IntegrityViolation::NonIncreasingTimestamp { .. })));
    }

    #[test]
    fn test_validate_bar_rejects_nan_and_zero() {
        let nan = Bar::new(0.0, 1.0, f64::NAN, 1.0, 1.0, 1.0);
        assert_eq!(validate_bar(&nan, None), Err(IntegrityViolation::NonFinite));

        let zero = Bar::new(0.0, 0.0, 1.0, 0.0, 1.0, 1.0);
        assert_eq!(validate_bar(&zero, None), Err(IntegrityViolation::NonPositivePrice));

        let ok = Bar::new(0.0, 1.0, 2.0, 1.0, 1.5, 0.0);
        assert!(validate_bar(&ok, None).is_ok());
    }

    #[test]
    fn test_candle_timestamps_strictly_increase() {
        let bars: Vec<Bar> = (0..50)
            .map(|i| {
                let p = 100.0 + ((i as f64) * 0.7).sin() * 5.0;
                make_bar(i as f64, p + 1.0, p - 1.0)
            })
            .collect();
        let series = normalize_bars(&bars, true);
        for pair in series.candles.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
    }
}
