//! Chan Technical Analysis - structural decomposition of price series.
//!
//! This crate turns an ordered OHLCV series into a hierarchy of structures
//! and scores how well that structure holds up.
//!
//! # Core Concepts
//!
//! - **Canonical candles**: validated bars with inclusion bars merged
//! - **Fractals**: local tops and bottoms on canonical candles
//! - **Strokes**: swings between alternating fractals
//! - **Segments**: higher-order legs made of strokes
//! - **Pivots**: price bands where at least three legs overlap
//! - **Divergence**: a new extreme reached on weaker MACD momentum
//!
//! # Architecture
//!
//! A run is a straight pipeline: normalize, then fractals, strokes,
//! segments, pivots at both leg levels, and divergence. Every structure
//! refers to earlier ones by index. The same immutable configuration is
//! threaded through every stage and validated before any stage runs.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chan_ta::{Analyzer, ChanAnalyzer, ChanConfig};
//! use chan_core::Bar;
//!
//! let analyzer = ChanAnalyzer::new(ChanConfig::default())?;
//!
//! let bars: Vec<Bar> = vec![/* your bar data */];
//! let result = analyzer.analyze(&bars)?;
//!
//! for pivot in &result.stroke_pivots {
//!     println!("Pivot [{}, {}]", pivot.lower, pivot.upper);
//! }
//! for signal in &result.divergences {
//!     println!("{} divergence at candle {}", signal.kind, signal.location);
//! }
//! ```

pub mod accuracy;
pub mod analyzer;
pub mod error;
pub mod normalize;
pub mod quality;
pub mod types;

// Re-export main analyzer types
pub use analyzer::{
    collect_signals, find_resonances, sort_signals, AggregatedTimeframes, AnalysisResult,
    Analyzer, Bias, ChanAnalyzer, DivergenceAnalyzer, MultiTimeframeCoordinator,
    MultiTimeframeResult, Resonance, SignalSource, TimeframeData, TimeframeDataBuilder,
    TimeframeOutcome, TimeframeSignal,
};

// Re-export core types
pub use types::{
    build_segments, build_strokes, detect_fractals, detect_pivots, AlignmentConfig, ChanConfig,
    Direction, DivergenceKind, DivergenceSignal, Fractal, FractalFilter, FractalKind, Leg,
    LegLevel, MomentumMeasure, Pivot, PivotBreakout, PivotEvent, PivotInteraction, PivotStatus,
    PivotTracker, ScoreWeights, Segment, SegmentBuilder, SegmentStatus, Stroke, StrokeBuilder,
};

pub use accuracy::{
    AccuracyEvaluator, AccuracyReport, CallCategory, CategoryAccuracy, ForwardCheck,
};
pub use error::{ChanError, EvaluationError, IntegrityViolation};
pub use normalize::{normalize_bars, BarExclusion, NormalizedSeries, Normalizer};
pub use quality::{Check, DimensionScore, Grade, QualityDimension, QualityScore, QualityScorer};

use chan_core::Timeframe;

/// Timeframes analyzed when none are configured.
pub fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::Day1, Timeframe::Week1, Timeframe::Month1]
}
