//! Analyzer module for structural analysis.
//!
//! A run is a straight pipeline over one bar series:
//! 1. Normalize: validate bars and merge inclusion candles
//! 2. Fractals, strokes and segments
//! 3. Pivots at stroke and segment level
//! 4. MACD divergence around each pivot

mod divergence;
mod multi_timeframe;

pub use divergence::{sort_signals, DivergenceAnalyzer};
pub use multi_timeframe::{
    collect_signals, find_resonances, AggregatedTimeframes, Bias, MultiTimeframeCoordinator,
    MultiTimeframeResult, Resonance, SignalSource, TimeframeData, TimeframeDataBuilder,
    TimeframeOutcome, TimeframeSignal,
};

use chan_core::Bar;
use serde::{Deserialize, Serialize};

use crate::error::ChanError;
use crate::normalize::{normalize_bars, NormalizedSeries};
use crate::types::{
    build_segments, build_strokes, detect_fractals, detect_pivots, ChanConfig, DivergenceSignal,
    Fractal, LegLevel, Pivot, Segment, Stroke,
};

/// Result of analyzing one bar series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Canonical candles, back-references and exclusions.
    pub series: NormalizedSeries,
    pub fractals: Vec<Fractal>,
    pub strokes: Vec<Stroke>,
    pub segments: Vec<Segment>,
    /// Pivots built from strokes.
    pub stroke_pivots: Vec<Pivot>,
    /// Pivots built from segments.
    pub segment_pivots: Vec<Pivot>,
    /// Divergences at both levels, ordered by location.
    pub divergences: Vec<DivergenceSignal>,
}

impl AnalysisResult {
    /// Timestamp of the canonical candle at `index`.
    pub fn timestamp_of(&self, index: usize) -> Option<f64> {
        self.series.timestamp_of(index)
    }

    /// Pivots at the given level.
    pub fn pivots(&self, level: LegLevel) -> &[Pivot] {
        match level {
            LegLevel::Stroke => &self.stroke_pivots,
            LegLevel::Segment => &self.segment_pivots,
        }
    }
}

/// Trait for structural analysis algorithms.
pub trait Analyzer: Send + Sync {
    /// Run the full pipeline over a bar series.
    fn analyze(&self, bars: &[Bar]) -> Result<AnalysisResult, ChanError>;

    /// Get the configuration.
    fn config(&self) -> &ChanConfig;
}

/// Default analyzer running every stage with one validated configuration.
#[derive(Debug, Clone)]
pub struct ChanAnalyzer {
    config: ChanConfig,
}

impl ChanAnalyzer {
    /// Create an analyzer. Fails if the configuration is invalid.
    pub fn new(config: ChanConfig) -> Result<Self, ChanError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Analyzer for ChanAnalyzer {
    fn analyze(&self, bars: &[Bar]) -> Result<AnalysisResult, ChanError> {
        let config = &self.config;

        let series = normalize_bars(bars, config.inclusion_merge);
        if series.len() < config.required_candles() {
            return Err(ChanError::InsufficientData {
                required: config.required_candles(),
                available: series.len(),
            });
        }

        let fractals = detect_fractals(&series.candles, config);
        let strokes = build_strokes(&fractals, config);
        let segments = build_segments(&strokes, config);
        let stroke_pivots = detect_pivots(&strokes, LegLevel::Stroke, config);
        let segment_pivots = detect_pivots(&segments, LegLevel::Segment, config);

        let divergence = DivergenceAnalyzer::from_config(config);
        let histogram = divergence.histogram(&series.candles);
        let mut divergences = divergence.detect(
            &histogram,
            &series,
            &strokes,
            &stroke_pivots,
            LegLevel::Stroke,
        );
        divergences.extend(divergence.detect(
            &histogram,
            &series,
            &segments,
            &segment_pivots,
            LegLevel::Segment,
        ));
        sort_signals(&mut divergences);

        log::debug!(
            "{} bars -> {} candles ({} excluded), {} fractals, {} strokes, {} segments, {}+{} pivots, {} divergences",
            bars.len(),
            series.len(),
            series.exclusions.len(),
            fractals.len(),
            strokes.len(),
            segments.len(),
            stroke_pivots.len(),
            segment_pivots.len(),
            divergences.len()
        );

        Ok(AnalysisResult {
            series,
            fractals,
            strokes,
            segments,
            stroke_pivots,
            segment_pivots,
            divergences,
        })
    }

    fn config(&self) -> &ChanConfig {
        &self.config
    }
}
