//! Segments - higher-order legs assembled from consecutive strokes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::config::ChanConfig;
use super::direction::Direction;
use super::pivot::Leg;
use super::stroke::Stroke;

/// Whether a segment has enough strokes to be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Provisional,
    Confirmed,
}

/// A contiguous run of strokes with a net direction.
///
/// Member strokes are `first_stroke..=last_stroke` in the stroke list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub first_stroke: usize,
    pub last_stroke: usize,
    pub direction: Direction,
    pub start_index: usize,
    pub end_index: usize,
    pub start_price: f64,
    pub end_price: f64,
    pub high: f64,
    pub low: f64,
    pub status: SegmentStatus,
    /// Stroke that terminated this segment, if any. Not a member.
    pub break_stroke: Option<usize>,
}

impl Segment {
    #[inline]
    pub fn stroke_count(&self) -> usize {
        self.last_stroke - self.first_stroke + 1
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.status == SegmentStatus::Confirmed
    }

    /// Member strokes, resolved against the full stroke list.
    pub fn strokes<'a>(&self, all: &'a [Stroke]) -> &'a [Stroke] {
        &all[self.first_stroke..=self.last_stroke]
    }
}

impl Leg for Segment {
    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn start_index(&self) -> usize {
        self.start_index
    }

    fn end_index(&self) -> usize {
        self.end_index
    }

    fn direction(&self) -> Direction {
        self.direction
    }
}

/// Segment under construction.
#[derive(Debug, Clone)]
struct BuildingSegment {
    direction: Direction,
    members: Vec<(usize, Stroke)>,
    /// Position in `members` of the stroke that set the extreme.
    extreme_pos: usize,
    extreme: f64,
    /// Last held counter-swing; a counter stroke beyond it breaks the segment.
    guard: f64,
    high: f64,
    low: f64,
}

impl BuildingSegment {
    fn start(index: usize, stroke: Stroke) -> Self {
        Self {
            direction: stroke.direction,
            members: vec![(index, stroke)],
            extreme_pos: 0,
            extreme: stroke.end.price,
            guard: stroke.start.price,
            high: stroke.high(),
            low: stroke.low(),
        }
    }

    fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Does this counter stroke break through the guard by more than the threshold?
    fn is_broken_by(&self, stroke: &Stroke, threshold: f64) -> bool {
        if stroke.direction == self.direction {
            return false;
        }
        let overshoot = match self.direction {
            Direction::Up => self.guard - stroke.end.price,
            Direction::Down => stroke.end.price - self.guard,
        };
        overshoot > threshold * self.range()
    }

    fn push(&mut self, index: usize, stroke: Stroke) {
        self.high = self.high.max(stroke.high());
        self.low = self.low.min(stroke.low());

        if stroke.direction == self.direction {
            let new_extreme = match self.direction {
                Direction::Up => stroke.end.price > self.extreme,
                Direction::Down => stroke.end.price < self.extreme,
            };
            if new_extreme {
                self.extreme = stroke.end.price;
                self.extreme_pos = self.members.len();
            }
        } else {
            self.guard = stroke.end.price;
        }

        self.members.push((index, stroke));
    }

    /// Cut at the extreme. Returns the finished segment and the strokes after the extreme.
    fn cut(
        mut self,
        break_stroke: usize,
        min_strokes: usize,
    ) -> (Segment, Vec<(usize, Stroke)>) {
        let leftover = self.members.split_off(self.extreme_pos + 1);
        let segment = finish(&self.members, self.direction, min_strokes, Some(break_stroke));
        (segment, leftover)
    }
}

fn finish(
    members: &[(usize, Stroke)],
    direction: Direction,
    min_strokes: usize,
    break_stroke: Option<usize>,
) -> Segment {
    let (first_index, first) = members[0];
    let (last_index, last) = members[members.len() - 1];
    let high = members.iter().map(|(_, s)| s.high()).fold(f64::NEG_INFINITY, f64::max);
    let low = members.iter().map(|(_, s)| s.low()).fold(f64::INFINITY, f64::min);

    let status = if break_stroke.is_some() && members.len() >= min_strokes {
        SegmentStatus::Confirmed
    } else {
        SegmentStatus::Provisional
    };

    Segment {
        first_stroke: first_index,
        last_stroke: last_index,
        direction,
        start_index: first.start.index,
        end_index: last.end.index,
        start_price: first.start.price,
        end_price: last.end.price,
        high,
        low,
        status,
        break_stroke,
    }
}

/// Builds segments from a stroke sequence.
#[derive(Debug)]
pub struct SegmentBuilder {
    min_strokes: usize,
    break_threshold: f64,
    active: Option<BuildingSegment>,
    completed: Vec<Segment>,
}

impl SegmentBuilder {
    pub fn new(min_strokes: usize, break_threshold: f64) -> Self {
        Self {
            min_strokes,
            break_threshold,
            active: None,
            completed: Vec::new(),
        }
    }

    pub fn from_config(config: &ChanConfig) -> Self {
        Self::new(config.min_segment_strokes, config.segment_break_threshold)
    }

    /// Process the stroke at `index`. Returns how many segments were completed.
    pub fn process(&mut self, index: usize, stroke: &Stroke) -> usize {
        let before = self.completed.len();
        let mut queue = VecDeque::from([(index, *stroke)]);

        while let Some((i, s)) = queue.pop_front() {
            let Some(active) = self.active.as_mut() else {
                self.active = Some(BuildingSegment::start(i, s));
                continue;
            };

            if !active.is_broken_by(&s, self.break_threshold) {
                active.push(i, s);
                continue;
            }

            if let Some(active) = self.active.take() {
                let (segment, leftover) = active.cut(i, self.min_strokes);
                self.completed.push(segment);
                // Strokes after the extreme open the next segment, then the break stroke
                queue.push_front((i, s));
                for item in leftover.into_iter().rev() {
                    queue.push_front(item);
                }
            }
        }

        self.completed.len() - before
    }

    /// Segments terminated so far.
    pub fn completed(&self) -> &[Segment] {
        &self.completed
    }

    /// Direction of the segment currently being built.
    pub fn current_direction(&self) -> Option<Direction> {
        self.active.as_ref().map(|a| a.direction)
    }

    /// Close out the builder. The trailing segment stays provisional.
    pub fn finalize(mut self) -> Vec<Segment> {
        if let Some(active) = self.active.take() {
            self.completed
                .push(finish(&active.members, active.direction, self.min_strokes, None));
        }
        self.completed
    }
}

/// Build segments from a slice of strokes.
pub fn build_segments(strokes: &[Stroke], config: &ChanConfig) -> Vec<Segment> {
    let mut builder = SegmentBuilder::from_config(config);
    for (i, stroke) in strokes.iter().enumerate() {
        builder.process(i, stroke);
    }
    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fractal, FractalKind};

    /// Chain strokes through the given turning prices, 4 candles apart.
    fn make_strokes(prices: &[f64]) -> Vec<Stroke> {
        let fractal = |i: usize, price: f64, kind| Fractal {
            index: i * 4,
            kind,
            price,
            strength: 0.01,
        };
        prices
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let start_kind = if w[1] > w[0] {
                    FractalKind::Bottom
                } else {
                    FractalKind::Top
                };
                Stroke::new(
                    fractal(i, w[0], start_kind),
                    fractal(i + 1, w[1], start_kind.opposite()),
                )
            })
            .collect()
    }

    #[test]
    fn test_trending_strokes_form_one_segment() {
        // Higher highs and higher lows
        let strokes = make_strokes(&[100.0, 110.0, 105.0, 115.0, 110.0, 120.0]);
        let segments = build_segments(&strokes, &ChanConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].direction, Direction::Up);
        assert_eq!(segments[0].stroke_count(), 5);
        assert_eq!(segments[0].status, SegmentStatus::Provisional);
        assert_eq!(segments[0].high, 120.0);
        assert_eq!(segments[0].low, 100.0);
    }

    #[test]
    fn test_break_below_higher_low_confirms_segment() {
        // Up: 100 -> 110 -> 105 -> 115, then a drop to 95 breaks the 105 guard
        let strokes = make_strokes(&[100.0, 110.0, 105.0, 115.0, 95.0, 100.0]);
        let segments = build_segments(&strokes, &ChanConfig::default());
        assert_eq!(segments.len(), 2);

        let first = segments[0];
        assert_eq!(first.direction, Direction::Up);
        assert_eq!((first.first_stroke, first.last_stroke), (0, 2));
        assert_eq!(first.status, SegmentStatus::Confirmed);
        assert_eq!(first.break_stroke, Some(3));
        assert_eq!(first.end_price, 115.0);

        let second = segments[1];
        assert_eq!(second.direction, Direction::Down);
        assert_eq!(second.first_stroke, 3);
        assert_eq!(second.status, SegmentStatus::Provisional);
    }

    #[test]
    fn test_short_segment_stays_provisional() {
        // The first pullback already breaks below the start
        let strokes = make_strokes(&[100.0, 110.0, 90.0, 95.0]);
        let segments = build_segments(&strokes, &ChanConfig::default());
        assert_eq!(segments[0].stroke_count(), 1);
        assert_eq!(segments[0].status, SegmentStatus::Provisional);
        assert_eq!(segments[0].break_stroke, Some(1));
    }

    #[test]
    fn test_strokes_after_extreme_move_to_next_segment() {
        // Extreme at 120 (stroke 2); stroke 3 pulls back, stroke 4 fails, stroke 5 breaks
        let strokes = make_strokes(&[100.0, 110.0, 104.0, 120.0, 112.0, 116.0, 100.0]);
        let segments = build_segments(&strokes, &ChanConfig::default());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].last_stroke, 2);
        assert_eq!(segments[0].high, 120.0);
        assert_eq!(segments[1].first_stroke, 3);
        assert_eq!(segments[1].last_stroke, 5);
        assert_eq!(segments[1].direction, Direction::Down);
    }

    #[test]
    fn test_members_are_contiguous_and_alternate() {
        let prices: Vec<f64> = (0..30)
            .map(|i| {
                let base = 100.0 + ((i as f64) * 0.4).sin() * 20.0;
                if i % 2 == 0 {
                    base
                } else {
                    base + 8.0
                }
            })
            .collect();
        let strokes = make_strokes(&prices);
        let segments = build_segments(&strokes, &ChanConfig::default());

        let mut expected_first = 0;
        for segment in &segments {
            assert_eq!(segment.first_stroke, expected_first);
            expected_first = segment.last_stroke + 1;
            let members = segment.strokes(&strokes);
            assert_eq!(members[0].direction, segment.direction);
            for pair in members.windows(2) {
                assert_ne!(pair[0].direction, pair[1].direction);
            }
            if segment.is_confirmed() {
                assert!(segment.stroke_count() >= 3);
            }
        }
        assert_eq!(expected_first, strokes.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(build_segments(&[], &ChanConfig::default()).is_empty());
    }
}
