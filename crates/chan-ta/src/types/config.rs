//! Configuration types for the analyzer.
//!
//! One immutable [`ChanConfig`] is threaded through every stage of a run.
//! Validation happens once, before any stage executes.

use chan_indicators::MacdConfig;
use serde::{Deserialize, Serialize};

use crate::error::ChanError;

/// How a leg's momentum is summarized from the MACD histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumMeasure {
    /// Signed sum of histogram values over the leg.
    #[default]
    Area,
    /// Most extreme histogram value in the leg's direction.
    Peak,
}

/// Thresholds for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanConfig {
    /// Odd window width for fractal detection.
    pub fractal_window: usize,
    /// Minimum candle distance between consecutive accepted fractals.
    pub min_fractal_gap: usize,
    /// Minimum candle span of a stroke.
    pub min_stroke_bars: usize,
    /// Minimum relative price move of a stroke.
    pub min_stroke_pct: f64,
    /// Strokes a segment needs before it can be confirmed.
    pub min_segment_strokes: usize,
    /// Break tolerance, as a fraction of the segment's range.
    pub segment_break_threshold: f64,
    /// Legs in a pivot's initial overlap window.
    pub min_zhongshu_strokes: usize,
    /// Relative tolerance around a pivot's bounds.
    pub zhongshu_overlap_threshold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Merge inclusion bars during normalization.
    pub inclusion_merge: bool,
    /// Minimum relative momentum change for a divergence.
    pub divergence_threshold: f64,
    pub momentum_measure: MomentumMeasure,
}

impl Default for ChanConfig {
    fn default() -> Self {
        Self {
            fractal_window: 3,
            min_fractal_gap: 2,
            min_stroke_bars: 3,
            min_stroke_pct: 0.002,
            min_segment_strokes: 3,
            segment_break_threshold: 0.005,
            min_zhongshu_strokes: 3,
            zhongshu_overlap_threshold: 0.001,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            inclusion_merge: true,
            divergence_threshold: 0.001,
            momentum_measure: MomentumMeasure::Area,
        }
    }
}

impl ChanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable inclusion merging.
    pub fn without_inclusion_merge(mut self) -> Self {
        self.inclusion_merge = false;
        self
    }

    /// Use a different momentum measure for divergence.
    pub fn with_momentum_measure(mut self, measure: MomentumMeasure) -> Self {
        self.momentum_measure = measure;
        self
    }

    /// Radius of the fractal window around its center candle.
    #[inline]
    pub fn fractal_radius(&self) -> usize {
        (self.fractal_window - 1) / 2
    }

    /// Canonical candles needed before any stage can produce output.
    pub fn required_candles(&self) -> usize {
        self.fractal_window
    }

    /// MACD parameters derived from this configuration.
    pub fn macd_config(&self) -> MacdConfig {
        MacdConfig {
            fast_period: self.macd_fast,
            slow_period: self.macd_slow,
            signal_period: self.macd_signal,
            ..Default::default()
        }
    }

    /// Check every option. Runs before any stage.
    pub fn validate(&self) -> Result<(), ChanError> {
        if self.fractal_window < 3 || self.fractal_window % 2 == 0 {
            return Err(invalid(format!(
                "fractal_window must be odd and at least 3, got {}",
                self.fractal_window
            )));
        }
        for (name, value) in [
            ("min_stroke_bars", self.min_stroke_bars),
            ("min_segment_strokes", self.min_segment_strokes),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if self.min_zhongshu_strokes < 2 {
            return Err(invalid(format!(
                "min_zhongshu_strokes must be at least 2, got {}",
                self.min_zhongshu_strokes
            )));
        }
        for (name, value) in [
            ("min_stroke_pct", self.min_stroke_pct),
            ("segment_break_threshold", self.segment_break_threshold),
            ("zhongshu_overlap_threshold", self.zhongshu_overlap_threshold),
            ("divergence_threshold", self.divergence_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.macd_fast >= self.macd_slow {
            return Err(invalid(format!(
                "macd_fast ({}) must be less than macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        Ok(())
    }
}

/// Weights of the quality rubric dimensions. They must sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub data_quality: f64,
    pub fractals: f64,
    pub strokes: f64,
    pub segments: f64,
    pub pivots: f64,
    pub divergence: f64,
    pub signals: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            data_quality: 20.0,
            fractals: 20.0,
            strokes: 15.0,
            segments: 15.0,
            pivots: 15.0,
            divergence: 10.0,
            signals: 5.0,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.data_quality
            + self.fractals
            + self.strokes
            + self.segments
            + self.pivots
            + self.divergence
            + self.signals
    }

    pub fn validate(&self) -> Result<(), ChanError> {
        let weights = [
            self.data_quality,
            self.fractals,
            self.strokes,
            self.segments,
            self.pivots,
            self.divergence,
            self.signals,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("score weights must be finite and non-negative".to_string()));
        }
        if (self.total() - 100.0).abs() > 1e-6 {
            return Err(invalid(format!(
                "score weights must sum to 100, got {}",
                self.total()
            )));
        }
        Ok(())
    }
}

/// Settings for cross-timeframe signal alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Maximum distance in seconds between resonating signals.
    pub tolerance_secs: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            // One week
            tolerance_secs: 7.0 * 86_400.0,
        }
    }
}

impl AlignmentConfig {
    pub fn new(tolerance_secs: f64) -> Self {
        Self { tolerance_secs }
    }

    pub fn validate(&self) -> Result<(), ChanError> {
        if !self.tolerance_secs.is_finite() || self.tolerance_secs < 0.0 {
            return Err(invalid(format!(
                "alignment tolerance must be finite and non-negative, got {}",
                self.tolerance_secs
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ChanError {
    ChanError::InvalidConfig(message)
}
