//! Core types for structural analysis.

pub mod config;
pub mod direction;
pub mod divergence;
pub mod fractal;
pub mod pivot;
pub mod segment;
pub mod stroke;

pub use config::{AlignmentConfig, ChanConfig, MomentumMeasure, ScoreWeights};
pub use direction::{Direction, FractalKind};
pub use divergence::{DivergenceKind, DivergenceSignal};
pub use fractal::{detect_fractals, Fractal, FractalFilter};
pub use pivot::{
    detect_pivots, Leg, LegLevel, Pivot, PivotBreakout, PivotEvent, PivotInteraction,
    PivotStatus, PivotTracker,
};
pub use segment::{build_segments, Segment, SegmentBuilder, SegmentStatus};
pub use stroke::{build_strokes, Stroke, StrokeBuilder};
