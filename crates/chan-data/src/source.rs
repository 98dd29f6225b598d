//! Data source trait definition.

use chan_core::Bar;

/// Trait for types that can load bar data.
///
/// This trait uses `anyhow::Result` for flexible error handling.
pub trait DataSource {
    fn load(&self) -> anyhow::Result<Vec<Bar>>;
}
