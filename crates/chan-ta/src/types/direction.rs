//! Direction types shared by strokes, segments and pivots.

use serde::{Deserialize, Serialize};

/// Direction of a price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction of a move from `from` to `to`. Flat counts as down.
    #[inline]
    pub fn of_move(from: f64, to: f64) -> Self {
        if to > from {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
        }
    }
}

/// Which extreme a fractal marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FractalKind {
    Top,
    Bottom,
}

impl FractalKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            FractalKind::Top => FractalKind::Bottom,
            FractalKind::Bottom => FractalKind::Top,
        }
    }

    /// Direction of a stroke that starts at a fractal of this kind.
    #[inline]
    pub fn outgoing(self) -> Direction {
        match self {
            FractalKind::Top => Direction::Down,
            FractalKind::Bottom => Direction::Up,
        }
    }
}

impl std::fmt::Display for FractalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FractalKind::Top => write!(f, "Top"),
            FractalKind::Bottom => write!(f, "Bottom"),
        }
    }
}
