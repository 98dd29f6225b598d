//! TimeSeries container for indicator output.

use serde::{Deserialize, Serialize};

/// A series of values aligned with canonical candle indices.
///
/// Values before `start_index` are not stored; indicators with a warm-up
/// period start their output at the first index where they are defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<T> {
    values: Vec<Option<T>>,
    start_index: usize,
}

impl<T> TimeSeries<T> {
    /// Creates a new empty TimeSeries.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            start_index: 0,
        }
    }

    /// Creates a TimeSeries with the given values starting at the specified index.
    pub fn with_offset(values: Vec<Option<T>>, start_index: usize) -> Self {
        Self {
            values,
            start_index,
        }
    }

    /// Returns the starting index of this series.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gets the value at the given candle index, if available.
    pub fn get(&self, index: usize) -> Option<&T> {
        let local = index.checked_sub(self.start_index)?;
        self.values.get(local).and_then(|v| v.as_ref())
    }

    /// Returns true if every index in `start..=end` has a value.
    pub fn covers(&self, start: usize, end: usize) -> bool {
        start >= self.start_index
            && end < self.start_index + self.values.len()
            && (start..=end).all(|i| self.get(i).is_some())
    }

    /// Returns an iterator over (index, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|val| (self.start_index + i, val)))
    }

    /// Iterates over the defined values within `start..=end`.
    pub fn range(&self, start: usize, end: usize) -> impl Iterator<Item = &T> {
        (start..=end).filter_map(move |i| self.get(i))
    }

    pub fn values(&self) -> &[Option<T>] {
        &self.values
    }
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> TimeSeries<T> {
    /// Creates a TimeSeries from a slice of values, all present.
    pub fn from_values(values: &[T], start_index: usize) -> Self {
        Self {
            values: values.iter().cloned().map(Some).collect(),
            start_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_respects_offset() {
        let series = TimeSeries::from_values(&[1.0, 2.0, 3.0], 5);
        assert_eq!(series.get(4), None);
        assert_eq!(series.get(5), Some(&1.0));
        assert_eq!(series.get(7), Some(&3.0));
        assert_eq!(series.get(8), None);
    }

    #[test]
    fn test_covers() {
        let series = TimeSeries::from_values(&[1.0, 2.0, 3.0], 5);
        assert!(series.covers(5, 7));
        assert!(series.covers(6, 6));
        assert!(!series.covers(4, 6));
        assert!(!series.covers(6, 8));
    }

    #[test]
    fn test_range_sum() {
        let series = TimeSeries::from_values(&[1.0, -2.0, 4.0], 0);
        let total: f64 = series.range(0, 2).sum();
        assert_eq!(total, 3.0);
    }
}
