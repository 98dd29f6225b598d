//! Configuration management for chan.
//!
//! Loads configuration from TOML files with support for per-timeframe
//! analysis parameters.

use chan_core::{Timeframe, UnknownTimeframe};
use chan_ta::{AlignmentConfig, ChanConfig, ChanError, MomentumMeasure, ScoreWeights};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(#[from] ChanError),
    #[error("Invalid config: {0}")]
    Timeframe(#[from] UnknownTimeframe),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub analysis: AnalysisConfig,
    pub scoring: ScoreWeights,
    pub alignment: AlignmentSection,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./chan.toml`
    /// 2. `~/.config/chan/config.toml`
    ///
    /// Returns default config if no file found.
    pub fn load_default() -> Self {
        if let Ok(config) = Self::load(Self::default_path()) {
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("chan").join("config.toml");
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(ConfigError::ReadError(_)) => {}
                Err(e) => log::warn!("ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("chan.toml")
    }

    /// Get analysis config for a specific timeframe label.
    /// Falls back to the default if the timeframe is not configured.
    pub fn analysis_for_timeframe(&self, timeframe: &str) -> ChanConfig {
        self.analysis
            .timeframes
            .get(timeframe)
            .map(|tf| tf.apply(&self.analysis.default))
            .unwrap_or_else(|| self.analysis.default.clone())
    }

    /// Timeframes to analyze, parsed from their labels.
    pub fn timeframes(&self) -> Result<Vec<Timeframe>, ConfigError> {
        let mut timeframes = self
            .alignment
            .timeframes
            .iter()
            .map(|label| label.parse::<Timeframe>())
            .collect::<Result<Vec<_>, _>>()?;
        timeframes.sort();
        timeframes.dedup();
        Ok(timeframes)
    }

    pub fn alignment_config(&self) -> AlignmentConfig {
        AlignmentConfig::new(self.alignment.tolerance_secs)
    }

    /// Check every section, including each merged per-timeframe config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.default.validate()?;
        for label in self.analysis.timeframes.keys() {
            label.parse::<Timeframe>()?;
            self.analysis_for_timeframe(label).validate()?;
        }
        self.scoring.validate()?;
        self.alignment_config().validate()?;
        self.timeframes()?;
        Ok(())
    }
}

/// General application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// CSV file to analyze when none is given on the command line.
    pub data_path: Option<PathBuf>,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            pretty: true,
        }
    }
}

/// Analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Default analysis parameters.
    pub default: ChanConfig,
    /// Per-timeframe overrides keyed by timeframe label.
    #[serde(default)]
    pub timeframes: HashMap<String, ChanOverride>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut timeframes = HashMap::new();

        // Coarse series are short; accept shorter strokes there
        timeframes.insert(
            "1M".to_string(),
            ChanOverride {
                min_stroke_bars: Some(2),
                ..Default::default()
            },
        );

        Self {
            default: ChanConfig::default(),
            timeframes,
        }
    }
}

/// Analysis override (all fields optional for partial overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanOverride {
    pub fractal_window: Option<usize>,
    pub min_fractal_gap: Option<usize>,
    pub min_stroke_bars: Option<usize>,
    pub min_stroke_pct: Option<f64>,
    pub min_segment_strokes: Option<usize>,
    pub segment_break_threshold: Option<f64>,
    pub min_zhongshu_strokes: Option<usize>,
    pub zhongshu_overlap_threshold: Option<f64>,
    pub macd_fast: Option<usize>,
    pub macd_slow: Option<usize>,
    pub macd_signal: Option<usize>,
    pub inclusion_merge: Option<bool>,
    pub divergence_threshold: Option<f64>,
    pub momentum_measure: Option<MomentumMeasure>,
}

impl ChanOverride {
    /// Merge onto a base config, using override values where present.
    pub fn apply(&self, base: &ChanConfig) -> ChanConfig {
        ChanConfig {
            fractal_window: self.fractal_window.unwrap_or(base.fractal_window),
            min_fractal_gap: self.min_fractal_gap.unwrap_or(base.min_fractal_gap),
            min_stroke_bars: self.min_stroke_bars.unwrap_or(base.min_stroke_bars),
            min_stroke_pct: self.min_stroke_pct.unwrap_or(base.min_stroke_pct),
            min_segment_strokes: self.min_segment_strokes.unwrap_or(base.min_segment_strokes),
            segment_break_threshold: self
                .segment_break_threshold
                .unwrap_or(base.segment_break_threshold),
            min_zhongshu_strokes: self.min_zhongshu_strokes.unwrap_or(base.min_zhongshu_strokes),
            zhongshu_overlap_threshold: self
                .zhongshu_overlap_threshold
                .unwrap_or(base.zhongshu_overlap_threshold),
            macd_fast: self.macd_fast.unwrap_or(base.macd_fast),
            macd_slow: self.macd_slow.unwrap_or(base.macd_slow),
            macd_signal: self.macd_signal.unwrap_or(base.macd_signal),
            inclusion_merge: self.inclusion_merge.unwrap_or(base.inclusion_merge),
            divergence_threshold: self.divergence_threshold.unwrap_or(base.divergence_threshold),
            momentum_measure: self.momentum_measure.unwrap_or(base.momentum_measure),
        }
    }
}

/// Cross-timeframe alignment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSection {
    /// Maximum distance in seconds between resonating signals.
    pub tolerance_secs: f64,
    /// Timeframe labels to analyze, e.g. `["1d", "1w", "1M"]`.
    pub timeframes: Vec<String>,
}

impl Default for AlignmentSection {
    fn default() -> Self {
        Self {
            tolerance_secs: AlignmentConfig::default().tolerance_secs,
            timeframes: chan_ta::default_timeframes()
                .iter()
                .map(|tf| tf.label().to_string())
                .collect(),
        }
    }
}
