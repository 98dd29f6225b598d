//! Weighted quality rubric for an analysis result.
//!
//! Each dimension is a handful of tiered checks. A dimension's points are
//! normalized to [0, 1] and scaled by its weight; the weights sum to 100.

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisResult;
use crate::error::ChanError;
use crate::types::{Direction, DivergenceKind, FractalKind, ScoreWeights};

const DAY_SECS: f64 = 86_400.0;

/// Share of the most recent candles scanned for actionable signals.
const RECENT_WINDOW: f64 = 0.1;

/// Rubric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    DataQuality,
    Fractals,
    Strokes,
    Segments,
    Pivots,
    Divergence,
    Signals,
}

impl QualityDimension {
    pub fn all() -> &'static [QualityDimension] {
        &[
            QualityDimension::DataQuality,
            QualityDimension::Fractals,
            QualityDimension::Strokes,
            QualityDimension::Segments,
            QualityDimension::Pivots,
            QualityDimension::Divergence,
            QualityDimension::Signals,
        ]
    }

    fn weight(self, weights: &ScoreWeights) -> f64 {
        match self {
            QualityDimension::DataQuality => weights.data_quality,
            QualityDimension::Fractals => weights.fractals,
            QualityDimension::Strokes => weights.strokes,
            QualityDimension::Segments => weights.segments,
            QualityDimension::Pivots => weights.pivots,
            QualityDimension::Divergence => weights.divergence,
            QualityDimension::Signals => weights.signals,
        }
    }
}

/// Letter grade for a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::APlus
        } else if score >= 80.0 {
            Grade::A
        } else if score >= 70.0 {
            Grade::B
        } else if score >= 60.0 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        write!(f, "{label}")
    }
}

/// Outcome of a single tiered check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    /// Measured value the tier was picked from.
    pub value: f64,
    pub points: u32,
    pub max_points: u32,
}

impl Check {
    fn new(name: &str, value: f64, points: u32, max_points: u32) -> Self {
        Self {
            name: name.to_string(),
            value,
            points,
            max_points,
        }
    }
}

/// Score of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    pub weight: f64,
    /// Weighted contribution to the total, in `[0, weight]`.
    pub score: f64,
    pub checks: Vec<Check>,
}

impl DimensionScore {
    fn from_checks(dimension: QualityDimension, weight: f64, checks: Vec<Check>) -> Self {
        let points: u32 = checks.iter().map(|c| c.points).sum();
        let max_points: u32 = checks.iter().map(|c| c.max_points).sum();
        let ratio = if max_points == 0 {
            0.0
        } else {
            points as f64 / max_points as f64
        };
        Self {
            dimension,
            weight,
            score: ratio * weight,
            checks,
        }
    }

    /// Fraction of the dimension's points earned.
    pub fn ratio(&self) -> f64 {
        if self.weight == 0.0 {
            0.0
        } else {
            self.score / self.weight
        }
    }
}

/// Composite quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// In `[0, 100]`.
    pub total: f64,
    pub grade: Grade,
    pub dimensions: Vec<DimensionScore>,
}

impl QualityScore {
    pub fn dimension(&self, dimension: QualityDimension) -> Option<&DimensionScore> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }
}

/// Points for `value` from descending tiers of `(lo, hi, points)`, else `fallback`.
fn tier(value: f64, tiers: &[(f64, f64, u32)], fallback: u32) -> u32 {
    tiers
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&value))
        .map_or(fallback, |(_, _, points)| *points)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// min/max of two counts, 0 when both are zero.
fn balance(a: usize, b: usize) -> f64 {
    let max = a.max(b);
    if max == 0 {
        0.0
    } else {
        a.min(b) as f64 / max as f64
    }
}

/// Scores analysis results against a weighted rubric.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    weights: ScoreWeights,
}

impl QualityScorer {
    /// Create a scorer. Fails if the weights do not sum to 100.
    pub fn new(weights: ScoreWeights) -> Result<Self, ChanError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn score(&self, result: &AnalysisResult) -> QualityScore {
        let dimensions: Vec<DimensionScore> = QualityDimension::all()
            .iter()
            .map(|&dimension| {
                let checks = match dimension {
                    QualityDimension::DataQuality => data_checks(result),
                    QualityDimension::Fractals => fractal_checks(result),
                    QualityDimension::Strokes => stroke_checks(result),
                    QualityDimension::Segments => segment_checks(result),
                    QualityDimension::Pivots => pivot_checks(result),
                    QualityDimension::Divergence => divergence_checks(result),
                    QualityDimension::Signals => signal_checks(result),
                };
                DimensionScore::from_checks(dimension, dimension.weight(&self.weights), checks)
            })
            .collect();

        let total = dimensions.iter().map(|d| d.score).sum::<f64>().clamp(0.0, 100.0);
        let grade = Grade::from_score(total);
        log::info!("quality score {total:.1} ({grade})");

        QualityScore {
            total,
            grade,
            dimensions,
        }
    }
}

fn data_checks(result: &AnalysisResult) -> Vec<Check> {
    let series = &result.series;
    let raw = series.raw_count as f64;
    let bars = Check::new(
        "bar_count",
        raw,
        tier(raw, &[(500.0, f64::MAX, 5), (200.0, f64::MAX, 4)], 3),
        5,
    );

    let excluded = series.exclusion_ratio();
    let exclusions = Check::new(
        "exclusion_ratio",
        excluded,
        tier(excluded, &[(0.0, 0.0, 5), (0.0, 0.01, 4), (0.0, 0.05, 2)], 0),
        5,
    );

    let span_days = match (series.candles.first(), series.candles.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp) / DAY_SECS,
        _ => 0.0,
    };
    let span = Check::new(
        "time_span_days",
        span_days,
        tier(span_days, &[(365.0, f64::MAX, 5), (180.0, f64::MAX, 4)], 3),
        5,
    );

    let high = series.candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = series.candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let range = if series.is_empty() { 0.0 } else { (high - low) / low };
    let price_range = Check::new(
        "price_range",
        range,
        tier(range, &[(0.2, f64::MAX, 5), (0.1, f64::MAX, 4)], 3),
        5,
    );

    vec![bars, exclusions, span, price_range]
}

fn fractal_checks(result: &AnalysisResult) -> Vec<Check> {
    let fractals = &result.fractals;
    if fractals.is_empty() {
        return vec![Check::new("fractal_count", 0.0, 0, 20)];
    }

    let count = fractals.len() as f64;
    let tops = fractals.iter().filter(|f| f.kind == FractalKind::Top).count();
    let ratio = balance(tops, fractals.len() - tops);
    let density = count / result.series.len().max(1) as f64;
    let strong = fractals.iter().filter(|f| f.strength > 0.02).count() as f64 / count;

    vec![
        Check::new(
            "fractal_count",
            count,
            tier(count, &[(50.0, 150.0, 5), (30.0, 200.0, 4)], 3),
            5,
        ),
        Check::new(
            "top_bottom_balance",
            ratio,
            tier(ratio, &[(0.7, 1.0, 5), (0.5, 1.0, 4)], 3),
            5,
        ),
        Check::new(
            "fractal_density",
            density,
            tier(density, &[(0.15, 0.35, 5), (0.10, 0.40, 4)], 3),
            5,
        ),
        Check::new(
            "strong_fractal_ratio",
            strong,
            tier(strong, &[(0.2, 0.4, 5), (0.1, 0.5, 4)], 3),
            5,
        ),
    ]
}

fn stroke_checks(result: &AnalysisResult) -> Vec<Check> {
    let strokes = &result.strokes;
    let count = strokes.len() as f64;
    let mut checks = vec![Check::new(
        "stroke_count",
        count,
        tier(count, &[(30.0, 80.0, 4), (20.0, 100.0, 3)], 2),
        4,
    )];

    let Some(avg_span) = mean(strokes.iter().map(|s| s.bar_span as f64)) else {
        checks.push(Check::new("stroke_span", 0.0, 0, 11));
        return checks;
    };
    let variance = mean(strokes.iter().map(|s| (s.bar_span as f64 - avg_span).powi(2)))
        .unwrap_or_default();
    let span_points = if (5.0..=15.0).contains(&avg_span) && variance.sqrt() <= 10.0 {
        4
    } else {
        tier(avg_span, &[(3.0, 20.0, 3)], 2)
    };
    checks.push(Check::new("stroke_span", avg_span, span_points, 4));

    let avg_amplitude = mean(strokes.iter().map(|s| s.amplitude)).unwrap_or_default();
    checks.push(Check::new(
        "stroke_amplitude",
        avg_amplitude,
        tier(avg_amplitude, &[(0.02, 0.15, 4), (0.01, 0.25, 3)], 2),
        4,
    ));

    let alternation = if strokes.len() > 1 {
        let flips = strokes
            .windows(2)
            .filter(|w| w[0].direction != w[1].direction)
            .count();
        flips as f64 / (strokes.len() - 1) as f64
    } else {
        0.0
    };
    checks.push(Check::new(
        "direction_alternation",
        alternation,
        tier(alternation, &[(0.8, 1.0, 3), (0.6, 1.0, 2)], 1),
        3,
    ));

    checks
}

fn segment_checks(result: &AnalysisResult) -> Vec<Check> {
    let segments = &result.segments;
    let count = segments.len() as f64;
    let mut checks = vec![Check::new(
        "segment_count",
        count,
        tier(count, &[(5.0, 20.0, 4), (3.0, 30.0, 3)], 2),
        4,
    )];

    let Some(avg_length) = mean(segments.iter().map(|s| (s.end_index - s.start_index) as f64))
    else {
        checks.push(Check::new("segment_length", 0.0, 0, 11));
        return checks;
    };
    checks.push(Check::new(
        "segment_length",
        avg_length,
        tier(avg_length, &[(10.0, 50.0, 4), (5.0, 80.0, 3)], 2),
        4,
    ));

    let up = segments.iter().filter(|s| s.direction == Direction::Up).count();
    let ratio = balance(up, segments.len() - up);
    checks.push(Check::new(
        "direction_balance",
        ratio,
        tier(ratio, &[(0.6, 1.0, 4), (0.4, 1.0, 3)], 2),
        4,
    ));

    let confirmed = segments.iter().filter(|s| s.is_confirmed()).count() as f64 / count;
    checks.push(Check::new(
        "confirmed_ratio",
        confirmed,
        tier(confirmed, &[(0.8, 1.0, 3), (0.5, 1.0, 2)], 1),
        3,
    ));

    checks
}

fn pivot_checks(result: &AnalysisResult) -> Vec<Check> {
    let pivots = &result.stroke_pivots;
    let count = pivots.len() as f64;
    let mut checks = vec![Check::new(
        "pivot_count",
        count,
        tier(count, &[(5.0, 20.0, 4), (3.0, 30.0, 3)], 2),
        4,
    )];

    let Some(avg_width) = mean(
        pivots
            .iter()
            .filter(|p| p.upper > p.lower)
            .map(|p| p.width()),
    ) else {
        checks.push(Check::new("pivot_width", 0.0, 0, 11));
        return checks;
    };
    checks.push(Check::new(
        "pivot_width",
        avg_width,
        tier(avg_width, &[(0.01, 0.08, 4), (0.005, 0.15, 3)], 2),
        4,
    ));

    let avg_length =
        mean(pivots.iter().map(|p| (p.end_index - p.start_index) as f64)).unwrap_or_default();
    checks.push(Check::new(
        "pivot_length",
        avg_length,
        tier(avg_length, &[(10.0, 50.0, 4), (5.0, 80.0, 3)], 2),
        4,
    ));

    // Consecutive pivots sharing both time and price
    let overlap = if pivots.len() > 1 {
        let overlapping = pivots
            .windows(2)
            .filter(|w| {
                w[0].end_index >= w[1].start_index
                    && w[0].upper.min(w[1].upper) > w[0].lower.max(w[1].lower)
            })
            .count();
        let ratio = overlapping as f64 / (pivots.len() - 1) as f64;
        Check::new(
            "pivot_overlap",
            ratio,
            tier(ratio, &[(0.0, 0.3, 3), (0.0, 0.5, 2)], 1),
            3,
        )
    } else {
        Check::new("pivot_overlap", 0.0, 0, 3)
    };
    checks.push(overlap);

    checks
}

fn divergence_checks(result: &AnalysisResult) -> Vec<Check> {
    let divergences = &result.divergences;
    let count = divergences.len() as f64;
    let mut checks = vec![Check::new(
        "divergence_count",
        count,
        tier(count, &[(3.0, 15.0, 3), (1.0, 25.0, 2)], 1),
        3,
    )];

    if divergences.is_empty() {
        checks.push(Check::new("divergence_balance", 0.0, 0, 3));
        checks.push(Check::new("divergence_spacing", 0.0, 0, 4));
        return checks;
    }

    let tops = divergences.iter().filter(|d| d.kind == DivergenceKind::Top).count();
    let ratio = balance(tops, divergences.len() - tops);
    checks.push(Check::new(
        "divergence_balance",
        ratio,
        tier(ratio, &[(0.5, 1.0, 3), (0.3, 1.0, 2)], 1),
        3,
    ));

    let spacing = mean(
        divergences
            .windows(2)
            .map(|w| (w[1].location - w[0].location) as f64),
    );
    checks.push(match spacing {
        Some(avg) => Check::new(
            "divergence_spacing",
            avg,
            tier(avg, &[(20.0, 100.0, 4), (10.0, 150.0, 3)], 2),
            4,
        ),
        None => Check::new("divergence_spacing", 0.0, 0, 4),
    });

    checks
}

fn signal_checks(result: &AnalysisResult) -> Vec<Check> {
    let len = result.series.len();
    let window = ((len as f64 * RECENT_WINDOW).ceil() as usize).max(1);
    let cutoff = len.saturating_sub(window);

    let mut bullish = 0;
    let mut bearish = 0;
    for d in result.divergences.iter().filter(|d| d.location >= cutoff) {
        match d.kind {
            DivergenceKind::Bottom => bullish += 1,
            DivergenceKind::Top => bearish += 1,
        }
    }
    for b in result
        .stroke_pivots
        .iter()
        .filter_map(|p| p.breakout)
        .filter(|b| b.candle_index >= cutoff)
    {
        match b.direction {
            Direction::Up => bullish += 1,
            Direction::Down => bearish += 1,
        }
    }

    let total = (bullish + bearish) as f64;
    let count_points = match bullish + bearish {
        0 => 0,
        1..=5 => 2,
        _ => 1,
    };
    let ratio = balance(bullish, bearish);
    let balance_points = match (bullish, bearish) {
        (0, 0) => 0,
        (0, _) | (_, 0) => 1,
        _ => tier(ratio, &[(0.5, 1.0, 2)], 1),
    };

    // An unbroken last pivot is the reference band for the next signal
    let live_pivot = u32::from(result.stroke_pivots.last().is_some_and(|p| !p.is_broken()));

    vec![
        Check::new("recent_signals", total, count_points, 2),
        Check::new("recent_balance", ratio, balance_points, 2),
        Check::new("live_pivot", f64::from(live_pivot), live_pivot, 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analyzer, ChanAnalyzer};
    use crate::types::ChanConfig;
    use chan_core::Bar;

    fn make_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let t = i as f64;
                let c = 100.0 + (t * 0.15).sin() * 12.0 + (t * 0.02).sin() * 20.0;
                Bar::new(t * 86_400.0, c, c * 1.01, c * 0.99, c, 1000.0)
            })
            .collect()
    }

    fn analyze(bars: &[Bar]) -> AnalysisResult {
        ChanAnalyzer::new(ChanConfig::default())
            .expect("valid config")
            .analyze(bars)
            .expect("analysis")
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(Grade::from_score(95.0), Grade::APlus);
        assert_eq!(Grade::from_score(90.0), Grade::APlus);
        assert_eq!(Grade::from_score(89.9), Grade::A);
        assert_eq!(Grade::from_score(70.0), Grade::B);
        assert_eq!(Grade::from_score(60.0), Grade::C);
        assert_eq!(Grade::from_score(10.0), Grade::D);
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn test_weights_must_sum_to_100() {
        let weights = ScoreWeights {
            signals: 50.0,
            ..Default::default()
        };
        assert!(QualityScorer::new(weights).is_err());
        assert!(QualityScorer::new(ScoreWeights::default()).is_ok());
    }

    #[test]
    fn test_tier_picks_first_match() {
        let tiers = [(50.0, 150.0, 5), (30.0, 200.0, 4)];
        assert_eq!(tier(100.0, &tiers, 3), 5);
        assert_eq!(tier(180.0, &tiers, 3), 4);
        assert_eq!(tier(10.0, &tiers, 3), 3);
    }

    #[test]
    fn test_score_in_range() {
        let scorer = QualityScorer::new(ScoreWeights::default()).expect("valid weights");
        let score = scorer.score(&analyze(&make_bars(600)));

        assert!((0.0..=100.0).contains(&score.total));
        assert_eq!(score.dimensions.len(), 7);
        for dimension in &score.dimensions {
            assert!(dimension.score >= 0.0);
            assert!(dimension.score <= dimension.weight + 1e-9);
        }
        let sum: f64 = score.dimensions.iter().map(|d| d.score).sum();
        assert!((sum - score.total).abs() < 1e-9);
        assert_eq!(score.grade, Grade::from_score(score.total));
    }

    #[test]
    fn test_exclusions_lower_data_quality() {
        let scorer = QualityScorer::new(ScoreWeights::default()).expect("valid weights");
        let clean = make_bars(600);
        let mut dirty = clean.clone();
        for i in (10..600).step_by(10) {
            dirty[i].high = -1.0;
        }

        let clean_score = scorer.score(&analyze(&clean));
        let dirty_score = scorer.score(&analyze(&dirty));
        let data = |s: &QualityScore| {
            s.dimension(QualityDimension::DataQuality)
                .map(|d| d.score)
                .unwrap_or_default()
        };
        assert!(data(&dirty_score) < data(&clean_score));
    }

    #[test]
    fn test_empty_structure_scores_low() {
        let bars: Vec<Bar> = (0..50)
            .map(|i| {
                let c = 100.0 + i as f64;
                Bar::new(i as f64 * 86_400.0, c, c * 1.01, c * 0.99, c, 1.0)
            })
            .collect();
        let scorer = QualityScorer::new(ScoreWeights::default()).expect("valid weights");
        let score = scorer.score(&analyze(&bars));

        let fractals = score.dimension(QualityDimension::Fractals).expect("dimension");
        assert_eq!(fractals.score, 0.0);
        assert!(score.total < 60.0);
        assert_eq!(score.grade, Grade::D);
    }
}
