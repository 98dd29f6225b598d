//! Pivots (zhongshu) - consolidation zones where consecutive legs overlap.
//!
//! A pivot forms when `min_zhongshu_strokes` consecutive legs share a common
//! price band. Later legs either extend it or break out of it. Once broken a
//! pivot is frozen.
//!
//! A pivot's entering leg is the leg just before its first member. The first
//! pivot of a series may start at leg 0 and then has none. After a break, the
//! breaking leg enters the next pivot and never starts its overlap window.

use serde::{Deserialize, Serialize};

use super::config::ChanConfig;
use super::direction::Direction;

/// Anything with a price span over a candle range: strokes and segments.
pub trait Leg {
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn start_index(&self) -> usize;
    fn end_index(&self) -> usize;
    fn direction(&self) -> Direction;
}

/// Which kind of leg a pivot is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegLevel {
    Stroke,
    Segment,
}

/// Lifecycle state of a pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotStatus {
    /// Initial overlap window only.
    Forming,
    /// At least one later leg has joined.
    Extended,
    /// A leg left the band entirely. Terminal.
    Broken,
}

/// Record of a pivot being broken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotBreakout {
    pub direction: Direction,
    /// Index of the breaking leg. Not a member.
    pub leg: usize,
    /// Candle index where the breaking leg ends.
    pub candle_index: usize,
}

/// An overlapping-range consolidation zone.
///
/// Member legs are `first_leg..=last_leg` at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub level: LegLevel,
    /// Minimum of the initial legs' highs.
    pub upper: f64,
    /// Maximum of the initial legs' lows.
    pub lower: f64,
    /// Leg that led into the band, if any. Not a member.
    pub entering_leg: Option<usize>,
    pub first_leg: usize,
    pub last_leg: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub status: PivotStatus,
    pub breakout: Option<PivotBreakout>,
}

/// Minimal copy of a leg kept while looking for an overlap window.
#[derive(Debug, Clone, Copy)]
struct LegSnapshot {
    index: usize,
    high: f64,
    low: f64,
    start_index: usize,
    end_index: usize,
}

impl LegSnapshot {
    fn of<L: Leg>(index: usize, leg: &L) -> Self {
        Self {
            index,
            high: leg.high(),
            low: leg.low(),
            start_index: leg.start_index(),
            end_index: leg.end_index(),
        }
    }
}

impl Pivot {
    /// Try to form a pivot from an overlap window. Returns `None` if the
    /// legs share no price band.
    fn from_window(level: LegLevel, window: &[LegSnapshot]) -> Option<Self> {
        let first = window.first()?;
        let last = window.last()?;
        let entering_leg = first.index.checked_sub(1);
        let upper = window.iter().map(|l| l.high).fold(f64::INFINITY, f64::min);
        let lower = window.iter().map(|l| l.low).fold(f64::NEG_INFINITY, f64::max);

        (upper > lower).then_some(Self {
            level,
            entering_leg,
            upper,
            lower,
            first_leg: first.index,
            last_leg: last.index,
            start_index: first.start_index,
            end_index: last.end_index,
            status: PivotStatus::Forming,
            breakout: None,
        })
    }

    /// Width of the band relative to its lower bound.
    #[inline]
    pub fn width(&self) -> f64 {
        (self.upper - self.lower) / self.lower
    }

    #[inline]
    pub fn leg_count(&self) -> usize {
        self.last_leg - self.first_leg + 1
    }

    #[inline]
    pub fn contains_leg(&self, leg: usize) -> bool {
        (self.first_leg..=self.last_leg).contains(&leg)
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        self.status == PivotStatus::Broken
    }

    /// Check the next leg against the band and update state.
    ///
    /// `threshold` widens the band relative to its bounds.
    pub fn check_leg<L: Leg>(&mut self, index: usize, leg: &L, threshold: f64) -> PivotInteraction {
        if self.is_broken() {
            return PivotInteraction::None;
        }

        let upper_bound = self.upper * (1.0 + threshold);
        let lower_bound = self.lower * (1.0 - threshold);

        let direction = if leg.low() > upper_bound {
            Some(Direction::Up)
        } else if leg.high() < lower_bound {
            Some(Direction::Down)
        } else {
            None
        };

        match direction {
            Some(direction) => {
                let breakout = PivotBreakout {
                    direction,
                    leg: index,
                    candle_index: leg.end_index(),
                };
                self.status = PivotStatus::Broken;
                self.breakout = Some(breakout);
                PivotInteraction::Broken(breakout)
            }
            None => {
                self.last_leg = index;
                self.end_index = leg.end_index();
                self.status = PivotStatus::Extended;
                PivotInteraction::Extended
            }
        }
    }
}

/// The result of checking a leg against a pivot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PivotInteraction {
    /// Pivot already broken; nothing happened.
    None,
    /// The leg joined the pivot.
    Extended,
    /// The leg left the band.
    Broken(PivotBreakout),
}

/// Events emitted while tracking pivots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PivotEvent {
    Formed { pivot: usize },
    Extended { pivot: usize, leg: usize },
    Broken { pivot: usize, breakout: PivotBreakout },
}

/// Incremental pivot detection over a leg sequence.
#[derive(Debug)]
pub struct PivotTracker {
    level: LegLevel,
    window_size: usize,
    threshold: f64,
    window: Vec<LegSnapshot>,
    active: Option<Pivot>,
    pivots: Vec<Pivot>,
}

impl PivotTracker {
    pub fn new(level: LegLevel, window_size: usize, threshold: f64) -> Self {
        Self {
            level,
            window_size,
            threshold,
            window: Vec::with_capacity(window_size),
            active: None,
            pivots: Vec::new(),
        }
    }

    pub fn from_config(level: LegLevel, config: &ChanConfig) -> Self {
        Self::new(
            level,
            config.min_zhongshu_strokes,
            config.zhongshu_overlap_threshold,
        )
    }

    /// Process the leg at `index`. Legs must arrive in order.
    pub fn process<L: Leg>(&mut self, index: usize, leg: &L) -> Option<PivotEvent> {
        if let Some(active) = self.active.as_mut() {
            let pivot = self.pivots.len();
            match active.check_leg(index, leg, self.threshold) {
                PivotInteraction::Extended => {
                    return Some(PivotEvent::Extended { pivot, leg: index });
                }
                PivotInteraction::Broken(breakout) => {
                    if let Some(done) = self.active.take() {
                        self.pivots.push(done);
                    }
                    // The breaking leg enters the next pivot
                    self.window.clear();
                    return Some(PivotEvent::Broken { pivot, breakout });
                }
                PivotInteraction::None => {}
            }
        }

        self.window.push(LegSnapshot::of(index, leg));
        if self.window.len() > self.window_size {
            self.window.remove(0);
        }
        if self.window.len() < self.window_size {
            return None;
        }

        let pivot = Pivot::from_window(self.level, &self.window)?;
        self.window.clear();
        self.active = Some(pivot);
        Some(PivotEvent::Formed {
            pivot: self.pivots.len(),
        })
    }

    /// The pivot currently forming or extending, if any.
    pub fn active(&self) -> Option<&Pivot> {
        self.active.as_ref()
    }

    /// Pivots that have been broken so far.
    pub fn broken(&self) -> &[Pivot] {
        &self.pivots
    }

    /// All pivots, including an unbroken trailing one.
    pub fn finalize(mut self) -> Vec<Pivot> {
        if let Some(active) = self.active.take() {
            self.pivots.push(active);
        }
        self.pivots
    }
}

/// Detect pivots over a slice of legs.
pub fn detect_pivots<L: Leg>(legs: &[L], level: LegLevel, config: &ChanConfig) -> Vec<Pivot> {
    let mut tracker = PivotTracker::from_config(level, config);
    for (i, leg) in legs.iter().enumerate() {
        tracker.process(i, leg);
    }
    tracker.finalize()
}
