//! Fractals - local turning points on canonical candles.

use chan_core::Candle;
use serde::{Deserialize, Serialize};

use super::config::ChanConfig;
use super::direction::FractalKind;

/// A local high (top) or low (bottom) at a canonical candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fractal {
    /// Canonical candle index.
    pub index: usize,
    pub kind: FractalKind,
    /// High of the candle for a top, low for a bottom.
    pub price: f64,
    /// Relative prominence over the rest of the window.
    pub strength: f64,
}

impl Fractal {
    /// True if `self` is a higher top / lower bottom than `other`.
    ///
    /// Only meaningful for fractals of the same kind.
    #[inline]
    pub fn is_more_extreme_than(&self, other: &Fractal) -> bool {
        match self.kind {
            FractalKind::Top => self.price > other.price,
            FractalKind::Bottom => self.price < other.price,
        }
    }
}

/// Checks the window around `center` and returns any fractal found there.
///
/// A candle can be both a top and a bottom when merging is disabled; the
/// top is returned first.
fn fractals_at(candles: &[Candle], center: usize, radius: usize) -> [Option<Fractal>; 2] {
    let candle = &candles[center];
    let neighbors = || {
        candles[center - radius..=center + radius]
            .iter()
            .enumerate()
            .filter(move |(offset, _)| *offset != radius)
            .map(|(_, c)| c)
    };

    let max_high = neighbors().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = neighbors().map(|c| c.low).fold(f64::INFINITY, f64::min);

    let top = (candle.high > max_high).then(|| Fractal {
        index: center,
        kind: FractalKind::Top,
        price: candle.high,
        strength: (candle.high - max_high) / candle.high,
    });
    let bottom = (candle.low < min_low).then(|| Fractal {
        index: center,
        kind: FractalKind::Bottom,
        price: candle.low,
        strength: (min_low - candle.low) / candle.low,
    });

    [top, bottom]
}

/// Applies the minimum gap between consecutive accepted fractals.
#[derive(Debug)]
pub struct FractalFilter {
    min_gap: usize,
    accepted: Vec<Fractal>,
}

impl FractalFilter {
    pub fn new(min_gap: usize) -> Self {
        Self {
            // Two fractals can never share an index
            min_gap: min_gap.max(1),
            accepted: Vec::new(),
        }
    }

    /// Offer a candidate. Candidates must arrive in index order.
    ///
    /// A candidate too close to the last accepted fractal replaces it only
    /// if it is more extreme (same kind) or stronger (opposite kind).
    pub fn process(&mut self, candidate: Fractal) {
        match self.accepted.last_mut() {
            Some(last) if candidate.index - last.index < self.min_gap => {
                let replace = if candidate.kind == last.kind {
                    candidate.is_more_extreme_than(last)
                } else {
                    candidate.strength > last.strength
                };
                if replace {
                    *last = candidate;
                }
            }
            _ => self.accepted.push(candidate),
        }
    }

    pub fn finalize(self) -> Vec<Fractal> {
        self.accepted
    }
}

/// Detect fractals over a canonical candle series.
///
/// Edge candles without a full window never qualify, and comparisons are
/// strict, so a flat series produces nothing.
pub fn detect_fractals(candles: &[Candle], config: &ChanConfig) -> Vec<Fractal> {
    let radius = config.fractal_radius();
    let mut filter = FractalFilter::new(config.min_fractal_gap);

    if candles.len() < config.fractal_window {
        return Vec::new();
    }

    for center in radius..candles.len() - radius {
        for fractal in fractals_at(candles, center, radius).into_iter().flatten() {
            filter.process(fractal);
        }
    }

    filter.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chan_core::Bar;

    fn make_candles(highs: &[f64], lows: &[f64]) -> Vec<Candle> {
        highs
            .iter()
            .zip(lows)
            .enumerate()
            .map(|(i, (&h, &l))| Candle::from_bar(i, &Bar::new(i as f64, l, h, l, h, 1.0)))
            .collect()
    }

    #[test]
    fn test_seven_candle_scenario() {
        let highs = [10.0, 12.0, 15.0, 11.0, 9.0, 13.0, 10.0];
        let lows = [8.0, 10.0, 13.0, 9.0, 7.0, 11.0, 8.0];
        let candles = make_candles(&highs, &lows);

        let fractals = detect_fractals(&candles, &ChanConfig::default());
        assert_eq!(fractals.len(), 2);
        assert_eq!(fractals[0].index, 2);
        assert_eq!(fractals[0].kind, FractalKind::Top);
        assert_eq!(fractals[0].price, 15.0);
        assert_eq!(fractals[1].index, 4);
        assert_eq!(fractals[1].kind, FractalKind::Bottom);
        assert_eq!(fractals[1].price, 7.0);
    }

    #[test]
    fn test_flat_series_has_no_fractals() {
        let candles = make_candles(&[10.0; 8], &[9.0; 8]);
        assert!(detect_fractals(&candles, &ChanConfig::default()).is_empty());
    }

    #[test]
    fn test_equal_neighbor_is_not_a_top() {
        let candles = make_candles(&[10.0, 12.0, 12.0, 10.0], &[8.0, 9.0, 9.5, 8.0]);
        let fractals = detect_fractals(&candles, &ChanConfig::default());
        assert!(fractals.iter().all(|f| f.kind != FractalKind::Top));
    }

    #[test]
    fn test_same_kind_within_gap_keeps_more_extreme() {
        let mut filter = FractalFilter::new(3);
        let top = |index, price| Fractal {
            index,
            kind: FractalKind::Top,
            price,
            strength: 0.01,
        };
        filter.process(top(2, 15.0));
        filter.process(top(4, 16.0));
        filter.process(top(5, 16.0));
        let fractals = filter.finalize();
        assert_eq!(fractals.len(), 1);
        // Tie with index 5 keeps the earlier one
        assert_eq!(fractals[0].index, 4);
    }

    #[test]
    fn test_wider_window() {
        let highs = [10.0, 11.0, 12.0, 15.0, 12.0, 11.0, 10.0];
        let lows = [9.0, 10.0, 11.0, 14.0, 11.0, 10.0, 9.0];
        let config = ChanConfig {
            fractal_window: 5,
            ..Default::default()
        };
        let fractals = detect_fractals(&make_candles(&highs, &lows), &config);
        assert_eq!(fractals.len(), 1);
        assert_eq!(fractals[0].index, 3);
    }

    #[test]
    fn test_indices_strictly_increase() {
        let highs: Vec<f64> = (0..200).map(|i| 100.0 + ((i as f64) * 0.37).sin() * 8.0).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 1.5).collect();
        let fractals = detect_fractals(&make_candles(&highs, &lows), &ChanConfig::default());
        assert!(!fractals.is_empty());
        for pair in fractals.windows(2) {
            assert!(pair[1].index > pair[0].index);
        }
    }

    #[test]
    fn test_too_few_candles() {
        let candles = make_candles(&[10.0, 12.0], &[9.0, 11.0]);
        assert!(detect_fractals(&candles, &ChanConfig::default()).is_empty());
    }
}
