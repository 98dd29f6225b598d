//! MACD divergence between legs separated by a pivot.

use chan_core::{Candle, TimeSeries};
use chan_indicators::{Indicator, Macd};

use crate::normalize::NormalizedSeries;
use crate::types::{
    ChanConfig, Direction, DivergenceKind, DivergenceSignal, Leg, LegLevel, MomentumMeasure,
    Pivot,
};

/// Compares momentum of the leg entering a pivot with the first same-direction
/// leg after the pivot's core overlap window.
pub struct DivergenceAnalyzer {
    macd: Macd,
    measure: MomentumMeasure,
    threshold: f64,
    core_legs: usize,
}

impl DivergenceAnalyzer {
    pub fn from_config(config: &ChanConfig) -> Self {
        Self {
            macd: Macd::new(config.macd_config()),
            measure: config.momentum_measure,
            threshold: config.divergence_threshold,
            core_legs: config.min_zhongshu_strokes,
        }
    }

    /// MACD histogram over canonical candles.
    pub fn histogram(&self, candles: &[Candle]) -> TimeSeries<f64> {
        self.macd.calculate(candles).histogram
    }

    /// Momentum of a leg, or `None` if the histogram does not cover its span.
    pub fn leg_momentum<L: Leg>(&self, histogram: &TimeSeries<f64>, leg: &L) -> Option<f64> {
        let (start, end) = (leg.start_index(), leg.end_index());
        if !histogram.covers(start, end) {
            return None;
        }
        let values = histogram.range(start, end).copied();
        let momentum = match (self.measure, leg.direction()) {
            (MomentumMeasure::Area, _) => values.sum(),
            (MomentumMeasure::Peak, Direction::Up) => values.fold(f64::NEG_INFINITY, f64::max),
            (MomentumMeasure::Peak, Direction::Down) => values.fold(f64::INFINITY, f64::min),
        };
        Some(momentum)
    }

    /// Detect divergences for one leg level.
    pub fn detect<L: Leg>(
        &self,
        histogram: &TimeSeries<f64>,
        series: &NormalizedSeries,
        legs: &[L],
        pivots: &[Pivot],
        level: LegLevel,
    ) -> Vec<DivergenceSignal> {
        let mut signals = Vec::new();

        for (pivot_index, pivot) in pivots.iter().enumerate() {
            // The first pivot of a series may have nothing leading into it
            let Some(a_index) = pivot.entering_leg else {
                continue;
            };
            let Some(leg_a) = legs.get(a_index) else {
                continue;
            };
            let Some(b_index) = (pivot.first_leg + self.core_legs..legs.len())
                .find(|&j| legs[j].direction() == leg_a.direction())
            else {
                continue;
            };
            let leg_b = &legs[b_index];

            let (Some(momentum_a), Some(momentum_b)) = (
                self.leg_momentum(histogram, leg_a),
                self.leg_momentum(histogram, leg_b),
            ) else {
                continue;
            };

            let kind = match leg_a.direction() {
                Direction::Up if leg_b.high() > leg_a.high() && momentum_b < momentum_a => {
                    DivergenceKind::Top
                }
                Direction::Down if leg_b.low() < leg_a.low() && momentum_b > momentum_a => {
                    DivergenceKind::Bottom
                }
                _ => continue,
            };

            let delta = (momentum_b - momentum_a).abs();
            let strength = if momentum_a == 0.0 {
                1.0
            } else {
                delta / momentum_a.abs()
            };
            if strength <= self.threshold {
                continue;
            }

            let location = leg_b.end_index();
            signals.push(DivergenceSignal {
                kind,
                level,
                location,
                timestamp: series.timestamp_of(location).unwrap_or_default(),
                pivot: pivot_index,
                leg_a: a_index,
                leg_b: b_index,
                momentum_a,
                momentum_b,
                momentum_delta_sign: if kind == DivergenceKind::Top { -1 } else { 1 },
                strength,
            });
        }

        log::debug!("{:?} level: {} divergences", level, signals.len());
        signals
    }
}

/// Order signals by location, then level, then leg.
pub fn sort_signals(signals: &mut [DivergenceSignal]) {
    signals.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then(a.level.cmp(&b.level))
            .then(a.leg_b.cmp(&b.leg_b))
    });
}
