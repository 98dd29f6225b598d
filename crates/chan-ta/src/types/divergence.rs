//! Divergence signals between comparable legs around a pivot.

use serde::{Deserialize, Serialize};

use super::pivot::LegLevel;

/// Top: higher high on weaker momentum. Bottom: lower low on weaker momentum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    Top,
    Bottom,
}

impl std::fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivergenceKind::Top => write!(f, "Top"),
            DivergenceKind::Bottom => write!(f, "Bottom"),
        }
    }
}

/// A momentum divergence between leg A (before a pivot) and leg B (after it).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceSignal {
    pub kind: DivergenceKind,
    pub level: LegLevel,
    /// Candle index where leg B ends.
    pub location: usize,
    pub timestamp: f64,
    /// Index of the pivot separating the legs, at `level`.
    pub pivot: usize,
    pub leg_a: usize,
    pub leg_b: usize,
    pub momentum_a: f64,
    pub momentum_b: f64,
    /// Sign of momentum_b - momentum_a: -1 for top, +1 for bottom.
    pub momentum_delta_sign: i8,
    /// |momentum_b - momentum_a| / |momentum_a|, or 1.0 when momentum_a is zero.
    pub strength: f64,
}
