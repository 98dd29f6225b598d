//! Retrospective accuracy evaluation.
//!
//! The series is cut at a validation date and analyzed twice: once up to
//! the cutoff and once extended by the held-out horizon. Calls made on the
//! truncated series are checked against the extended one by candle
//! timestamp. A call that survives more data is a hit.
//!
//! Forward-looking checks (stroke direction and close-price trend against
//! the held-out bars) are reported on their own and never enter the hit rates.

use std::collections::HashSet;

use chan_core::Bar;
use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalysisResult, Analyzer, ChanAnalyzer};
use crate::error::{ChanError, EvaluationError};
use crate::types::{ChanConfig, Direction, DivergenceKind, FractalKind, Leg};

/// Kind of structural call being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCategory {
    Fractal,
    Stroke,
    Segment,
    PivotBreakout,
    Divergence,
}

impl CallCategory {
    pub fn all() -> &'static [CallCategory] {
        &[
            CallCategory::Fractal,
            CallCategory::Stroke,
            CallCategory::Segment,
            CallCategory::PivotBreakout,
            CallCategory::Divergence,
        ]
    }
}

/// Hit rate for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    pub category: CallCategory,
    pub calls: usize,
    pub hits: usize,
    /// `hits / calls`, or 1.0 when there were no calls.
    pub hit_rate: f64,
}

impl CategoryAccuracy {
    fn new(category: CallCategory, calls: usize, hits: usize) -> Self {
        Self {
            category,
            calls,
            hits,
            hit_rate: ratio(hits, calls),
        }
    }
}

/// Agreement of the last stroke's direction with the realized move over the
/// held-out bars. Reported apart from the structural hit rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardCheck {
    pub direction: Direction,
    /// Close of the last bar at or before the cutoff.
    pub start_close: f64,
    /// Close of the last held-out bar.
    pub end_close: f64,
    /// Relative change from `start_close` to `end_close`.
    pub realized_change: f64,
    pub agrees: bool,
}

/// Closes before the cutoff used for the historical trend.
const TREND_LOOKBACK: usize = 50;

/// Close-price trend before the cutoff against the trend of the held-out
/// bars. Slopes are least-squares fits per bar, relative to the cutoff close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendCheck {
    /// Closes used for the historical fit.
    pub lookback_bars: usize,
    pub historical_slope: f64,
    pub future_slope: f64,
    /// Both slopes point the same way.
    pub agrees: bool,
    /// Smaller over larger absolute slope, 0.5 if either is flat.
    pub strength_ratio: f64,
    /// Held-out high-low range relative to the cutoff close.
    pub volatility: f64,
    /// Mean of direction agreement and strength ratio.
    pub trend_score: f64,
    /// Mean of direction agreement and volatility plausibility.
    pub price_score: f64,
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub validation_date: f64,
    /// Bars after the cutoff included in the reference run.
    pub horizon_bars: usize,
    pub truncated_candles: usize,
    pub reference_candles: usize,
    pub categories: Vec<CategoryAccuracy>,
    /// Hits over calls across every category, 1.0 when there were none.
    pub overall: f64,
    pub forward: Option<ForwardCheck>,
    /// `None` with fewer than two held-out bars.
    pub trend: Option<TrendCheck>,
}

impl AccuracyReport {
    pub fn category(&self, category: CallCategory) -> Option<&CategoryAccuracy> {
        self.categories.iter().find(|c| c.category == category)
    }
}

fn ratio(hits: usize, calls: usize) -> f64 {
    if calls == 0 {
        1.0
    } else {
        hits as f64 / calls as f64
    }
}

/// A call reduced to what must match: timestamps plus a discriminant.
type CallKey = (u64, u64, u8);

fn key(start: f64, end: f64, tag: u8) -> CallKey {
    (start.to_bits(), end.to_bits(), tag)
}

fn calls(result: &AnalysisResult, category: CallCategory) -> Vec<CallKey> {
    let ts = |index: usize| result.timestamp_of(index).unwrap_or(f64::NAN);
    let dir = |d: Direction| u8::from(d.is_up());

    match category {
        CallCategory::Fractal => result
            .fractals
            .iter()
            .map(|f| {
                let t = ts(f.index);
                key(t, t, u8::from(f.kind == FractalKind::Top))
            })
            .collect(),
        CallCategory::Stroke => result
            .strokes
            .iter()
            .map(|s| key(ts(s.start_index()), ts(s.end_index()), dir(s.direction)))
            .collect(),
        CallCategory::Segment => result
            .segments
            .iter()
            .map(|s| key(ts(s.start_index()), ts(s.end_index()), dir(s.direction)))
            .collect(),
        CallCategory::PivotBreakout => result
            .stroke_pivots
            .iter()
            .filter_map(|p| p.breakout.map(|b| (p, b)))
            .map(|(p, b)| key(ts(p.start_index), ts(b.candle_index), dir(b.direction)))
            .collect(),
        CallCategory::Divergence => result
            .divergences
            .iter()
            .map(|d| {
                let tag = (u8::from(d.kind == DivergenceKind::Top) << 1) | d.level as u8;
                key(d.timestamp, d.timestamp, tag)
            })
            .collect(),
    }
}

/// Compares structure seen at a cutoff with structure seen afterwards.
#[derive(Debug, Clone)]
pub struct AccuracyEvaluator {
    analyzer: ChanAnalyzer,
}

impl AccuracyEvaluator {
    pub fn new(config: ChanConfig) -> Result<Self, ChanError> {
        Ok(Self {
            analyzer: ChanAnalyzer::new(config)?,
        })
    }

    /// Evaluate calls made with data up to `validation_date`.
    ///
    /// `horizon` limits how many later bars the reference run sees; `None`
    /// uses all of them.
    pub fn evaluate(
        &self,
        bars: &[Bar],
        validation_date: f64,
        horizon: Option<usize>,
    ) -> Result<AccuracyReport, EvaluationError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(EvaluationError::Truncated(ChanError::InsufficientData {
                required: self.analyzer.config().required_candles(),
                available: 0,
            }));
        };
        if validation_date < first.timestamp {
            return Err(EvaluationError::CutoffBeforeData {
                validation_date,
                first: first.timestamp,
            });
        }
        if validation_date > last.timestamp {
            return Err(EvaluationError::CutoffAfterData {
                validation_date,
                last: last.timestamp,
            });
        }

        let cut = bars.partition_point(|b| b.timestamp <= validation_date);
        let available = bars.len() - cut;
        let horizon_bars = match horizon {
            Some(requested) if requested > available => {
                return Err(EvaluationError::HorizonBeyondData {
                    requested,
                    available,
                })
            }
            Some(requested) => requested,
            None => available,
        };
        let end = cut + horizon_bars;

        let truncated = self
            .analyzer
            .analyze(&bars[..cut])
            .map_err(EvaluationError::Truncated)?;
        let reference = self
            .analyzer
            .analyze(&bars[..end])
            .map_err(EvaluationError::Reference)?;

        let categories: Vec<CategoryAccuracy> = CallCategory::all()
            .iter()
            .map(|&category| {
                let made = calls(&truncated, category);
                let seen: HashSet<CallKey> = calls(&reference, category).into_iter().collect();
                let hits = made.iter().filter(|k| seen.contains(k)).count();
                CategoryAccuracy::new(category, made.len(), hits)
            })
            .collect();

        let total_calls: usize = categories.iter().map(|c| c.calls).sum();
        let total_hits: usize = categories.iter().map(|c| c.hits).sum();
        let overall = ratio(total_hits, total_calls);

        let forward = forward_check(&truncated, &bars[cut - 1], &bars[cut..end]);
        let trend = trend_check(&bars[..cut], &bars[cut..end]);

        log::info!(
            "evaluation at {validation_date}: {total_hits}/{total_calls} calls held over {horizon_bars} bars"
        );

        Ok(AccuracyReport {
            validation_date,
            horizon_bars,
            truncated_candles: truncated.series.len(),
            reference_candles: reference.series.len(),
            categories,
            overall,
            forward,
            trend,
        })
    }
}

fn forward_check(
    truncated: &AnalysisResult,
    cutoff_bar: &Bar,
    held_out: &[Bar],
) -> Option<ForwardCheck> {
    let last_stroke = truncated.strokes.last()?;
    let end_bar = held_out.last()?;

    let realized_change = (end_bar.close - cutoff_bar.close) / cutoff_bar.close;
    let agrees = match last_stroke.direction {
        Direction::Up => realized_change > 0.0,
        Direction::Down => realized_change < 0.0,
    };

    Some(ForwardCheck {
        direction: last_stroke.direction,
        start_close: cutoff_bar.close,
        end_close: end_bar.close,
        realized_change,
        agrees,
    })
}

/// Least-squares slope of `values` against their position.
fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i * i) as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    (denominator != 0.0).then(|| (n * sum_xy - sum_x * sum_y) / denominator)
}

fn trend_check(history: &[Bar], held_out: &[Bar]) -> Option<TrendCheck> {
    if held_out.len() < 2 {
        return None;
    }
    let base = history.last()?.close;
    let lookback = &history[history.len().saturating_sub(TREND_LOOKBACK)..];
    let closes = |bars: &[Bar]| bars.iter().map(|b| b.close).collect::<Vec<_>>();

    let historical_slope = linear_slope(&closes(lookback)).unwrap_or_default() / base;
    let future_slope = linear_slope(&closes(held_out)).unwrap_or_default() / base;
    let agrees = historical_slope * future_slope > 0.0;

    let (a, b) = (historical_slope.abs(), future_slope.abs());
    let strength_ratio = if a > 0.0 && b > 0.0 { a.min(b) / a.max(b) } else { 0.5 };

    let high = held_out.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = held_out.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let volatility = (high - low) / base;
    let volatility_score = if (0.05..=0.30).contains(&volatility) {
        1.0
    } else if (0.02..=0.50).contains(&volatility) {
        0.8
    } else {
        0.6
    };

    let agreement = if agrees { 1.0 } else { 0.0 };
    Some(TrendCheck {
        lookback_bars: lookback.len(),
        historical_slope,
        future_slope,
        agrees,
        strength_ratio,
        volatility,
        trend_score: (agreement + strength_ratio) / 2.0,
        price_score: (agreement + volatility_score) / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: f64 = 86_400.0;

    fn make_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let t = i as f64;
                let c = 100.0 + (t * 0.15).sin() * 12.0 + (t * 0.02).sin() * 20.0;
                Bar::new(t * DAY, c, c * 1.01, c * 0.99, c, 1000.0)
            })
            .collect()
    }

    fn evaluator() -> AccuracyEvaluator {
        AccuracyEvaluator::new(ChanConfig::default()).expect("valid config")
    }

    #[test]
    fn test_reflexive_at_last_bar() {
        let bars = make_bars(300);
        let last = bars[bars.len() - 1].timestamp;
        let report = evaluator().evaluate(&bars, last, None).expect("evaluation");

        assert_eq!(report.horizon_bars, 0);
        assert_eq!(report.overall, 1.0);
        for category in &report.categories {
            assert_eq!(category.hit_rate, 1.0);
            assert_eq!(category.hits, category.calls);
        }
        assert!(report.forward.is_none());
        assert!(report.trend.is_none());
        let segments = report.category(CallCategory::Segment).expect("category");
        assert!(segments.calls > 0);
        assert_eq!(segments.hit_rate, 1.0);
    }

    #[test]
    fn test_cutoff_outside_data() {
        let bars = make_bars(50);
        assert!(matches!(
            evaluator().evaluate(&bars, -1.0, None),
            Err(EvaluationError::CutoffBeforeData { .. })
        ));
        assert!(matches!(
            evaluator().evaluate(&bars, 1000.0 * DAY, None),
            Err(EvaluationError::CutoffAfterData { .. })
        ));
    }

    #[test]
    fn test_horizon_beyond_data() {
        let bars = make_bars(50);
        let result = evaluator().evaluate(&bars, 40.0 * DAY, Some(20));
        assert_eq!(
            result,
            Err(EvaluationError::HorizonBeyondData {
                requested: 20,
                available: 9
            })
        );
    }

    #[test]
    fn test_truncated_failure_is_wrapped() {
        let bars = make_bars(50);
        let result = evaluator().evaluate(&bars, 0.0, None);
        assert!(matches!(
            result,
            Err(EvaluationError::Truncated(ChanError::InsufficientData { .. }))
        ));
    }

    #[test]
    fn test_partial_cutoff() {
        let bars = make_bars(400);
        let report = evaluator()
            .evaluate(&bars, 300.0 * DAY, Some(60))
            .expect("evaluation");

        assert_eq!(report.horizon_bars, 60);
        assert!(report.reference_candles > report.truncated_candles);
        assert!((0.0..=1.0).contains(&report.overall));
        for category in &report.categories {
            assert!(category.hits <= category.calls);
            assert!((0.0..=1.0).contains(&category.hit_rate));
        }
        // Early fractals are far from the cutoff and never revised
        let fractals = report.category(CallCategory::Fractal).expect("category");
        assert!(fractals.calls > 0);
        assert!(fractals.hits > 0);

        let forward = report.forward.expect("held-out bars exist");
        assert_eq!(forward.end_close, bars[360].close);
        assert_eq!(forward.start_close, bars[300].close);

        let segments = report.category(CallCategory::Segment).expect("category");
        assert!(segments.calls > 0);
        assert!(segments.hits <= segments.calls);

        let trend = report.trend.expect("held-out bars exist");
        assert_eq!(trend.lookback_bars, 50);
        assert!((0.0..=1.0).contains(&trend.trend_score));
        assert!((0.0..=1.0).contains(&trend.price_score));
    }

    #[test]
    fn test_linear_slope() {
        assert_eq!(linear_slope(&[1.0, 3.0, 5.0, 7.0]), Some(2.0));
        assert_eq!(linear_slope(&[4.0, 4.0, 4.0]), Some(0.0));
        assert_eq!(linear_slope(&[4.0]), None);
    }

    #[test]
    fn test_trend_check() {
        let bar = |t: usize, close: f64| {
            Bar::new(t as f64, close, close + 1.0, close - 1.0, close, 1.0)
        };
        let history: Vec<Bar> = (0..60).map(|i| bar(i, 40.0 + i as f64)).collect();
        // Cutoff close is 99; the future rises twice as fast
        let rising: Vec<Bar> = (0..5).map(|i| bar(60 + i, 101.0 + 2.0 * i as f64)).collect();
        let falling: Vec<Bar> = (0..5).map(|i| bar(60 + i, 98.0 - i as f64)).collect();

        let check = trend_check(&history, &rising).expect("check");
        assert_eq!(check.lookback_bars, 50);
        assert!(check.agrees);
        assert!((check.historical_slope - 1.0 / 99.0).abs() < 1e-12);
        assert!((check.future_slope - 2.0 / 99.0).abs() < 1e-12);
        assert!((check.strength_ratio - 0.5).abs() < 1e-12);
        // Range 100..110 over 99 is inside the plausible band
        assert!((check.volatility - 10.0 / 99.0).abs() < 1e-12);
        assert!((check.trend_score - 0.75).abs() < 1e-12);
        assert_eq!(check.price_score, 1.0);

        let against = trend_check(&history, &falling).expect("check");
        assert!(!against.agrees);
        assert!(against.trend_score <= 0.5);

        assert!(trend_check(&history, &rising[..1]).is_none());
    }

    #[test]
    fn test_forward_check_direction() {
        let truncated = AnalysisResult {
            strokes: vec![crate::types::Stroke::new(
                crate::types::Fractal {
                    index: 0,
                    kind: FractalKind::Bottom,
                    price: 90.0,
                    strength: 0.0,
                },
                crate::types::Fractal {
                    index: 4,
                    kind: FractalKind::Top,
                    price: 110.0,
                    strength: 0.0,
                },
            )],
            ..Default::default()
        };
        let cutoff = Bar::new(0.0, 100.0, 101.0, 99.0, 100.0, 1.0);
        let up = [Bar::new(1.0, 100.0, 106.0, 99.0, 105.0, 1.0)];
        let down = [Bar::new(1.0, 100.0, 101.0, 94.0, 95.0, 1.0)];

        let check = forward_check(&truncated, &cutoff, &up).expect("check");
        assert!(check.agrees);
        assert!((check.realized_change - 0.05).abs() < 1e-12);
        assert!(!forward_check(&truncated, &cutoff, &down).expect("check").agrees);
        assert!(forward_check(&truncated, &cutoff, &[]).is_none());
    }
}
