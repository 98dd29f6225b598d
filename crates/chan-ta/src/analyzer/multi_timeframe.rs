//! Multi-timeframe analysis orchestration.
//!
//! Each timeframe runs the full pipeline independently and in parallel.
//! Signals are then aligned in time: when timeframes agree on direction
//! within a tolerance window, the finest one is the trigger and the
//! coarsest one gives context.

use std::collections::BTreeMap;

use chan_core::{aggregate_bars, Bar, Timeframe};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{AnalysisResult, Analyzer, ChanAnalyzer};
use crate::error::ChanError;
use crate::normalize::{validate_bar, BarExclusion};
use crate::types::{AlignmentConfig, ChanConfig, Direction, DivergenceKind, LegLevel};

/// Bars for a single timeframe.
#[derive(Debug, Clone)]
pub struct TimeframeData<'a> {
    pub timeframe: Timeframe,
    pub bars: &'a [Bar],
    /// Bars dropped from the source series before aggregation.
    pub exclusions: &'a [BarExclusion],
    /// Size of the source series, when `bars` were aggregated from one.
    pub source_count: Option<usize>,
}

impl<'a> TimeframeData<'a> {
    pub fn new(timeframe: Timeframe, bars: &'a [Bar]) -> Self {
        Self {
            timeframe,
            bars,
            exclusions: &[],
            source_count: None,
        }
    }

    /// Mark the bars as aggregated from a source series of `source_count`
    /// bars, of which `exclusions` were malformed.
    pub fn with_source(mut self, exclusions: &'a [BarExclusion], source_count: usize) -> Self {
        self.exclusions = exclusions;
        self.source_count = Some(source_count);
        self
    }
}

/// Outcome of one timeframe. A failure here does not affect the others.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeOutcome {
    pub timeframe: Timeframe,
    pub result: Result<AnalysisResult, ChanError>,
}

/// Directional bias of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
}

/// What produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSource {
    Divergence {
        kind: DivergenceKind,
        level: LegLevel,
        index: usize,
    },
    PivotBreakout {
        direction: Direction,
        pivot: usize,
    },
}

/// A signal stamped with its timeframe and time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Timeframe,
    pub timestamp: f64,
    /// Candle index within the timeframe's own series.
    pub location: usize,
    pub bias: Bias,
    pub source: SignalSource,
}

/// Same-bias signals on two or more timeframes within the tolerance window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resonance {
    pub bias: Bias,
    /// Signal on the finest participating timeframe.
    pub trigger: TimeframeSignal,
    /// Signal on the coarsest participating timeframe.
    pub context: TimeframeSignal,
    /// One signal per participating timeframe, finest first.
    pub members: Vec<TimeframeSignal>,
}

impl Resonance {
    pub fn timeframe_count(&self) -> usize {
        self.members.len()
    }
}

/// Result of multi-timeframe analysis.
#[derive(Debug, Default)]
pub struct MultiTimeframeResult {
    /// Outcomes in the order the timeframes were given.
    pub outcomes: Vec<TimeframeOutcome>,
    /// All signals from successful timeframes, ordered by time then timeframe.
    pub signals: Vec<TimeframeSignal>,
    pub resonances: Vec<Resonance>,
}

impl MultiTimeframeResult {
    /// Get the analysis for a specific timeframe, if it succeeded.
    pub fn get(&self, timeframe: Timeframe) -> Option<&AnalysisResult> {
        self.outcomes
            .iter()
            .find(|o| o.timeframe == timeframe)
            .and_then(|o| o.result.as_ref().ok())
    }

    /// Timeframes whose analysis failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (Timeframe, &ChanError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.timeframe, e)))
    }
}

/// Collect the directional signals of one timeframe's analysis.
pub fn collect_signals(timeframe: Timeframe, result: &AnalysisResult) -> Vec<TimeframeSignal> {
    let divergences = result.divergences.iter().enumerate().map(|(index, d)| {
        TimeframeSignal {
            timeframe,
            timestamp: d.timestamp,
            location: d.location,
            bias: match d.kind {
                DivergenceKind::Top => Bias::Bearish,
                DivergenceKind::Bottom => Bias::Bullish,
            },
            source: SignalSource::Divergence {
                kind: d.kind,
                level: d.level,
                index,
            },
        }
    });

    let breakouts = result
        .stroke_pivots
        .iter()
        .enumerate()
        .filter_map(|(pivot, p)| p.breakout.map(|b| (pivot, b)))
        .filter_map(|(pivot, b)| {
            Some(TimeframeSignal {
                timeframe,
                timestamp: result.timestamp_of(b.candle_index)?,
                location: b.candle_index,
                bias: match b.direction {
                    Direction::Up => Bias::Bullish,
                    Direction::Down => Bias::Bearish,
                },
                source: SignalSource::PivotBreakout {
                    direction: b.direction,
                    pivot,
                },
            })
        });

    divergences.chain(breakouts).collect()
}

/// Find resonances among signals from several timeframes.
///
/// A signal is a trigger when a coarser timeframe has a same-bias signal
/// within `tolerance_secs` and no finer timeframe does. For each coarser
/// timeframe the nearest such signal joins (earliest on ties).
pub fn find_resonances(signals: &[TimeframeSignal], tolerance_secs: f64) -> Vec<Resonance> {
    let mut ordered: Vec<TimeframeSignal> = signals.to_vec();
    sort_by_time(&mut ordered);

    let mut resonances = Vec::new();

    for trigger in &ordered {
        let mut matched: BTreeMap<Timeframe, TimeframeSignal> = BTreeMap::new();

        for other in &ordered {
            if other.timeframe == trigger.timeframe || other.bias != trigger.bias {
                continue;
            }
            let distance = (other.timestamp - trigger.timestamp).abs();
            if distance > tolerance_secs {
                continue;
            }
            let closer = matched
                .get(&other.timeframe)
                .map_or(true, |best| distance < (best.timestamp - trigger.timestamp).abs());
            if closer {
                matched.insert(other.timeframe, *other);
            }
        }

        let has_finer = matched.keys().any(|tf| *tf < trigger.timeframe);
        if has_finer || matched.is_empty() {
            continue;
        }

        let mut members = vec![*trigger];
        members.extend(matched.into_values());
        let context = members[members.len() - 1];

        resonances.push(Resonance {
            bias: trigger.bias,
            trigger: *trigger,
            context,
            members,
        });
    }

    resonances
}

fn sort_by_time(signals: &mut [TimeframeSignal]) {
    signals.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then(a.timeframe.cmp(&b.timeframe))
            .then(a.location.cmp(&b.location))
    });
}

/// Runs the analyzer over several timeframes and aligns their signals.
pub struct MultiTimeframeCoordinator {
    analyzer: ChanAnalyzer,
    overrides: BTreeMap<Timeframe, ChanAnalyzer>,
    alignment: AlignmentConfig,
}

impl MultiTimeframeCoordinator {
    /// Create a coordinator sharing one configuration across timeframes.
    pub fn new(config: ChanConfig, alignment: AlignmentConfig) -> Result<Self, ChanError> {
        alignment.validate()?;
        Ok(Self {
            analyzer: ChanAnalyzer::new(config)?,
            overrides: BTreeMap::new(),
            alignment,
        })
    }

    /// Use a different configuration for one timeframe.
    pub fn with_timeframe_config(
        mut self,
        timeframe: Timeframe,
        config: ChanConfig,
    ) -> Result<Self, ChanError> {
        self.overrides.insert(timeframe, ChanAnalyzer::new(config)?);
        Ok(self)
    }

    /// The analyzer used for `timeframe`.
    pub fn analyzer_for(&self, timeframe: Timeframe) -> &ChanAnalyzer {
        self.overrides.get(&timeframe).unwrap_or(&self.analyzer)
    }

    pub fn alignment(&self) -> &AlignmentConfig {
        &self.alignment
    }

    /// Analyze every timeframe in parallel, then align signals.
    pub fn analyze(&self, data: &[TimeframeData<'_>]) -> MultiTimeframeResult {
        let outcomes: Vec<TimeframeOutcome> = data
            .par_iter()
            .map(|tf| {
                let mut result = self.analyzer_for(tf.timeframe).analyze(tf.bars);
                if let (Ok(analysis), Some(source_count)) = (result.as_mut(), tf.source_count) {
                    analysis.series.inherit_exclusions(tf.exclusions, source_count);
                }
                TimeframeOutcome {
                    timeframe: tf.timeframe,
                    result,
                }
            })
            .collect();

        let mut signals: Vec<TimeframeSignal> = outcomes
            .iter()
            .filter_map(|o| {
                o.result
                    .as_ref()
                    .ok()
                    .map(|r| collect_signals(o.timeframe, r))
            })
            .flatten()
            .collect();
        sort_by_time(&mut signals);

        let resonances = find_resonances(&signals, self.alignment.tolerance_secs);

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                log::warn!("{} analysis failed: {}", outcome.timeframe, e);
            }
        }
        log::info!(
            "analyzed {} timeframes: {} signals, {} resonances",
            outcomes.len(),
            signals.len(),
            resonances.len()
        );

        MultiTimeframeResult {
            outcomes,
            signals,
            resonances,
        }
    }
}

/// Aggregated bars for every configured timeframe, plus the record of
/// base bars that were too malformed to aggregate.
#[derive(Debug, Clone, Default)]
pub struct AggregatedTimeframes {
    pub series: Vec<(Timeframe, Vec<Bar>)>,
    /// Malformed base bars, indexed into the base input.
    pub exclusions: Vec<BarExclusion>,
    /// Number of base bars, including excluded ones.
    pub source_count: usize,
}

impl AggregatedTimeframes {
    /// Coordinator input for every timeframe, carrying the exclusions.
    pub fn data(&self) -> Vec<TimeframeData<'_>> {
        self.series
            .iter()
            .map(|(tf, bars)| {
                TimeframeData::new(*tf, bars).with_source(&self.exclusions, self.source_count)
            })
            .collect()
    }
}

/// Builder for aggregated bar data for multiple timeframes.
///
/// Takes bars from a base timeframe, sets malformed ones aside as
/// exclusions, and aggregates the rest into each configured timeframe.
pub struct TimeframeDataBuilder {
    timeframes: Vec<Timeframe>,
}

impl TimeframeDataBuilder {
    pub fn new(timeframes: Vec<Timeframe>) -> Self {
        Self { timeframes }
    }

    /// Build aggregated bars for each configured timeframe.
    pub fn build(&self, base_bars: &[Bar]) -> AggregatedTimeframes {
        let mut clean = Vec::with_capacity(base_bars.len());
        let mut exclusions = Vec::new();
        let mut last: Option<f64> = None;
        for (raw_index, bar) in base_bars.iter().enumerate() {
            match validate_bar(bar, last) {
                Ok(()) => {
                    last = Some(bar.timestamp);
                    clean.push(*bar);
                }
                Err(violation) => {
                    log::warn!("excluding bar {raw_index} at {}: {violation}", bar.timestamp);
                    exclusions.push(BarExclusion {
                        raw_index,
                        timestamp: bar.timestamp,
                        violation,
                    });
                }
            }
        }

        AggregatedTimeframes {
            series: self
                .timeframes
                .iter()
                .map(|tf| (*tf, aggregate_bars(&clean, *tf)))
                .collect(),
            exclusions,
            source_count: base_bars.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 86_400.0;

    fn signal(timeframe: Timeframe, day: f64, bias: Bias) -> TimeframeSignal {
        TimeframeSignal {
            timeframe,
            timestamp: day * DAY,
            location: day as usize,
            bias,
            source: SignalSource::PivotBreakout {
                direction: if bias == Bias::Bullish {
                    Direction::Up
                } else {
                    Direction::Down
                },
                pivot: 0,
            },
        }
    }

    fn daily_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let t = i as f64;
                let c = 100.0 + (t * 0.15).sin() * 12.0 + (t * 0.02).sin() * 20.0;
                Bar::new(t * DAY, c, c * 1.01, c * 0.99, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_resonance_requires_same_bias() {
        let signals = vec![
            signal(Timeframe::Day1, 10.0, Bias::Bullish),
            signal(Timeframe::Week1, 11.0, Bias::Bearish),
        ];
        assert!(find_resonances(&signals, 7.0 * DAY).is_empty());
    }

    #[test]
    fn test_resonance_within_tolerance() {
        let signals = vec![
            signal(Timeframe::Week1, 12.0, Bias::Bullish),
            signal(Timeframe::Day1, 10.0, Bias::Bullish),
            signal(Timeframe::Month1, 30.0, Bias::Bullish),
        ];
        let resonances = find_resonances(&signals, 7.0 * DAY);
        assert_eq!(resonances.len(), 1);

        let r = &resonances[0];
        assert_eq!(r.trigger.timeframe, Timeframe::Day1);
        assert_eq!(r.context.timeframe, Timeframe::Week1);
        assert_eq!(r.timeframe_count(), 2);
    }

    #[test]
    fn test_three_timeframe_resonance() {
        let signals = vec![
            signal(Timeframe::Day1, 20.0, Bias::Bearish),
            signal(Timeframe::Week1, 21.0, Bias::Bearish),
            signal(Timeframe::Month1, 18.0, Bias::Bearish),
        ];
        let resonances = find_resonances(&signals, 5.0 * DAY);
        assert_eq!(resonances.len(), 1);
        assert_eq!(resonances[0].trigger.timeframe, Timeframe::Day1);
        assert_eq!(resonances[0].context.timeframe, Timeframe::Month1);
        assert_eq!(resonances[0].members.len(), 3);
    }

    #[test]
    fn test_nearest_signal_joins() {
        let signals = vec![
            signal(Timeframe::Day1, 20.0, Bias::Bullish),
            signal(Timeframe::Week1, 15.0, Bias::Bullish),
            signal(Timeframe::Week1, 22.0, Bias::Bullish),
        ];
        let resonances = find_resonances(&signals, 7.0 * DAY);
        assert_eq!(resonances.len(), 1);
        assert_eq!(resonances[0].context.timestamp, 22.0 * DAY);
    }

    #[test]
    fn test_single_timeframe_never_resonates() {
        let signals = vec![
            signal(Timeframe::Day1, 1.0, Bias::Bullish),
            signal(Timeframe::Day1, 2.0, Bias::Bullish),
        ];
        assert!(find_resonances(&signals, 7.0 * DAY).is_empty());
    }

    #[test]
    fn test_builder_aggregates_and_records_malformed() {
        let mut bars = daily_bars(70);
        bars[5].high = bars[5].low - 1.0;
        let built = TimeframeDataBuilder::new(vec![Timeframe::Day1, Timeframe::Week1]).build(&bars);
        assert_eq!(built.series.len(), 2);
        assert_eq!(built.series[0].1.len(), 69);
        assert_eq!(built.series[1].0, Timeframe::Week1);
        assert_eq!(built.series[1].1.len(), 10);
        assert_eq!(built.source_count, 70);
        assert_eq!(built.exclusions.len(), 1);
        assert_eq!(built.exclusions[0].raw_index, 5);
    }

    #[test]
    fn test_coordinator_carries_exclusions_to_every_timeframe() {
        let mut bars = daily_bars(300);
        bars[150].high = bars[150].low - 5.0;
        let built = TimeframeDataBuilder::new(vec![Timeframe::Day1, Timeframe::Week1]).build(&bars);

        let coordinator =
            MultiTimeframeCoordinator::new(ChanConfig::default(), AlignmentConfig::default())
                .expect("valid config");
        let result = coordinator.analyze(&built.data());

        for tf in [Timeframe::Day1, Timeframe::Week1] {
            let series = &result.get(tf).expect("analysis").series;
            assert_eq!(series.exclusions.len(), 1);
            assert_eq!(series.exclusions[0].raw_index, 150);
            assert_eq!(series.source_count, Some(300));
            assert!(series.exclusion_ratio() > 0.0);
        }
        let daily = result.get(Timeframe::Day1).expect("analysis");
        assert_eq!(daily.series.raw_count, 299);
        assert!(daily.series.candles.iter().all(|c| c.timestamp != bars[150].timestamp));
    }

    #[test]
    fn test_coordinator_keeps_going_when_one_timeframe_fails() {
        let daily = daily_bars(600);
        let built = TimeframeDataBuilder::new(vec![Timeframe::Day1, Timeframe::Week1]).build(&daily);
        let tiny = vec![daily[0]];

        let mut data = built.data();
        data.push(TimeframeData::new(Timeframe::Month1, &tiny));

        let coordinator =
            MultiTimeframeCoordinator::new(ChanConfig::default(), AlignmentConfig::default())
                .expect("valid config");
        let result = coordinator.analyze(&data);

        assert_eq!(result.outcomes.len(), 3);
        assert!(result.get(Timeframe::Day1).is_some());
        assert!(result.get(Timeframe::Week1).is_some());
        let failures: Vec<_> = result.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Timeframe::Month1);
        assert!(matches!(failures[0].1, ChanError::InsufficientData { .. }));
    }

    #[test]
    fn test_coordinator_is_deterministic() {
        let daily = daily_bars(500);
        let built =
            TimeframeDataBuilder::new(vec![Timeframe::Day1, Timeframe::Week1]).build(&daily);
        let data = built.data();
        let coordinator =
            MultiTimeframeCoordinator::new(ChanConfig::default(), AlignmentConfig::default())
                .expect("valid config");

        let first = coordinator.analyze(&data);
        let second = coordinator.analyze(&data);
        assert_eq!(first.outcomes, second.outcomes);
        assert_eq!(first.signals, second.signals);
        assert_eq!(first.resonances, second.resonances);
    }

    #[test]
    fn test_timeframe_override() {
        let coordinator =
            MultiTimeframeCoordinator::new(ChanConfig::default(), AlignmentConfig::default())
                .expect("valid config")
                .with_timeframe_config(
                    Timeframe::Month1,
                    ChanConfig {
                        min_stroke_bars: 2,
                        ..Default::default()
                    },
                )
                .expect("valid override");
        assert_eq!(coordinator.analyzer_for(Timeframe::Month1).config().min_stroke_bars, 2);
        assert_eq!(coordinator.analyzer_for(Timeframe::Day1).config().min_stroke_bars, 3);
    }
}
