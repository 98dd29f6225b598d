//! Strokes - minimal directional swings between alternating fractals.

use serde::{Deserialize, Serialize};

use super::config::ChanConfig;
use super::direction::Direction;
use super::fractal::Fractal;
use super::pivot::Leg;

/// A swing from one fractal to an opposite-kind fractal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub start: Fractal,
    pub end: Fractal,
    pub direction: Direction,
    /// |end - start| / start.
    pub amplitude: f64,
    /// Candles between the two fractals.
    pub bar_span: usize,
}

impl Stroke {
    pub fn new(start: Fractal, end: Fractal) -> Self {
        Self {
            start,
            end,
            direction: Direction::of_move(start.price, end.price),
            amplitude: (end.price - start.price).abs() / start.price,
            bar_span: end.index - start.index,
        }
    }
}

impl Leg for Stroke {
    fn high(&self) -> f64 {
        self.start.price.max(self.end.price)
    }

    fn low(&self) -> f64 {
        self.start.price.min(self.end.price)
    }

    fn start_index(&self) -> usize {
        self.start.index
    }

    fn end_index(&self) -> usize {
        self.end.index
    }

    fn direction(&self) -> Direction {
        self.direction
    }
}

/// Builds strokes from a fractal sequence.
///
/// The builder keeps an anchor fractal. Same-kind fractals replace the
/// anchor when more extreme (dragging the last stroke's end along with it);
/// opposite-kind fractals either complete a stroke or are dropped.
#[derive(Debug)]
pub struct StrokeBuilder {
    min_bars: usize,
    min_pct: f64,
    anchor: Option<Fractal>,
    strokes: Vec<Stroke>,
}

impl StrokeBuilder {
    pub fn new(min_bars: usize, min_pct: f64) -> Self {
        Self {
            min_bars,
            min_pct,
            anchor: None,
            strokes: Vec::new(),
        }
    }

    pub fn from_config(config: &ChanConfig) -> Self {
        Self::new(config.min_stroke_bars, config.min_stroke_pct)
    }

    /// True if `start -> end` satisfies the span and amplitude minimums
    /// (both inclusive) and moves the way the fractal kinds imply.
    pub fn qualifies(&self, start: &Fractal, end: &Fractal) -> bool {
        if start.kind == end.kind || end.index <= start.index || end.price == start.price {
            return false;
        }
        let amplitude = (end.price - start.price).abs() / start.price;
        end.index - start.index >= self.min_bars
            && amplitude >= self.min_pct
            && Direction::of_move(start.price, end.price) == start.kind.outgoing()
    }

    /// Process the next fractal.
    pub fn process(&mut self, fractal: Fractal) {
        let Some(anchor) = self.anchor else {
            self.anchor = Some(fractal);
            return;
        };

        if fractal.kind == anchor.kind {
            if fractal.is_more_extreme_than(&anchor) {
                self.anchor = Some(fractal);
                if let Some(last) = self.strokes.last_mut() {
                    if last.end.index == anchor.index {
                        *last = Stroke::new(last.start, fractal);
                    }
                }
            }
            return;
        }

        if self.qualifies(&anchor, &fractal) {
            self.strokes.push(Stroke::new(anchor, fractal));
            self.anchor = Some(fractal);
        }
    }

    /// Strokes completed so far. The last one may still be extended.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn finalize(self) -> Vec<Stroke> {
        self.strokes
    }
}

/// Build strokes from a slice of fractals.
pub fn build_strokes(fractals: &[Fractal], config: &ChanConfig) -> Vec<Stroke> {
    let mut builder = StrokeBuilder::from_config(config);
    for fractal in fractals {
        builder.process(*fractal);
    }
    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FractalKind;

    fn top(index: usize, price: f64) -> Fractal {
        Fractal {
            index,
            kind: FractalKind::Top,
            price,
            strength: 0.01,
        }
    }

    fn bottom(index: usize, price: f64) -> Fractal {
        Fractal {
            index,
            kind: FractalKind::Bottom,
            price,
            strength: 0.01,
        }
    }

    #[test]
    fn test_simple_alternation() {
        let fractals = vec![bottom(0, 100.0), top(4, 110.0), bottom(8, 102.0)];
        let strokes = build_strokes(&fractals, &ChanConfig::default());
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].direction, Direction::Up);
        assert_eq!(strokes[1].direction, Direction::Down);
        assert_eq!(strokes[0].end, strokes[1].start);
        assert_eq!(strokes[0].bar_span, 4);
    }

    #[test]
    fn test_boundary_values_are_accepted() {
        let config = ChanConfig {
            min_stroke_bars: 3,
            min_stroke_pct: 0.002,
            ..Default::default()
        };
        // Span exactly 3, amplitude exactly 2 / 1000
        let strokes = build_strokes(&[bottom(0, 1000.0), top(3, 1002.0)], &config);
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].bar_span, 3);
    }

    #[test]
    fn test_short_span_is_dropped() {
        let strokes = build_strokes(&[bottom(0, 100.0), top(2, 110.0)], &ChanConfig::default());
        assert!(strokes.is_empty());
    }

    #[test]
    fn test_small_amplitude_is_dropped_and_retried() {
        let fractals = vec![
            bottom(0, 100.0),
            // Too small a move
            top(4, 100.1),
            bottom(6, 100.05),
            top(10, 105.0),
        ];
        let strokes = build_strokes(&fractals, &ChanConfig::default());
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes[0].start.index, 0);
        assert_eq!(strokes[0].end.index, 10);
    }

    #[test]
    fn test_more_extreme_same_kind_extends_last_stroke() {
        let fractals = vec![bottom(0, 100.0), top(4, 110.0), top(6, 112.0), bottom(10, 104.0)];
        let strokes = build_strokes(&fractals, &ChanConfig::default());
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].end.index, 6);
        assert_eq!(strokes[0].end.price, 112.0);
        assert_eq!(strokes[1].start.index, 6);
    }

    #[test]
    fn test_top_below_bottom_is_not_a_stroke() {
        let strokes = build_strokes(&[bottom(0, 100.0), top(5, 99.0)], &ChanConfig::default());
        assert!(strokes.is_empty());
    }

    #[test]
    fn test_stroke_invariants() {
        let fractals: Vec<Fractal> = (0..40)
            .map(|i| {
                let price = 100.0 + ((i * 7) % 11) as f64;
                if i % 2 == 0 {
                    bottom(i * 3, price - 5.0)
                } else {
                    top(i * 3, price + 5.0)
                }
            })
            .collect();
        let strokes = build_strokes(&fractals, &ChanConfig::default());
        assert!(!strokes.is_empty());
        for stroke in &strokes {
            assert!(stroke.start.index < stroke.end.index);
            assert_ne!(stroke.start.kind, stroke.end.kind);
            assert_eq!(
                stroke.direction == Direction::Up,
                stroke.end.price > stroke.start.price
            );
        }
        for pair in strokes.windows(2) {
            assert_ne!(pair[0].direction, pair[1].direction);
        }
    }
}
