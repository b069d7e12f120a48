//! Internal helpers shared by the typed layer.

pub mod sync;
