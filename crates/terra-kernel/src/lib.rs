//! # Terra Kernel
//!
//! Chunked GPU terrain-editing engine.
//!
//! This crate stores a large terrain raster as GPU-resident tiles and edits
//! it with offscreen brush passes:
//! - Bit-packed terrain cells, shoreline derivation and run-length persistence
//! - A bounded resource pool for render targets and offscreen renderers
//! - A lazily materialized tile grid with LRU eviction
//! - A batching brush engine (paint, erase, smooth, raise, lower)
//! - Viewport culling for the display pass
//!
//! ## Tile ping-pong
//!
//! Every resident tile owns two render targets. A brush pass reads the read
//! target and writes the write target; the grid then swaps them so the new
//! content becomes visible without a copy.
//!
//! ## Backends
//!
//! The engine is generic over [`TileBackend`]. [`WgpuBackend`] renders with
//! a fullscreen-triangle pipeline on any wgpu device, and [`CpuBackend`]
//! produces the same bytes in host memory.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod brush;
pub mod brush_kernel;
pub mod cell;
pub mod cpu_backend;
pub mod editor;
pub mod gpu_backend;
pub mod grid;
pub mod pool;
pub mod raster;
pub mod rle;
pub mod validation;
pub mod viewport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::brush::*;
    pub use crate::cell::*;
    pub use crate::cpu_backend::*;
    pub use crate::editor::*;
    pub use crate::gpu_backend::*;
    pub use crate::grid::*;
    pub use crate::pool::*;
    pub use crate::raster::*;
    pub use crate::rle::*;
    pub use crate::viewport::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<StrokeParams>(), 32);
        assert_eq!(std::mem::size_of::<BrushUniform>(), 16 + 32 * MAX_BATCH_STROKES);
    }

    #[test]
    fn test_shader_declares_batch_cap() {
        let declaration = format!("array<Stroke, {MAX_BATCH_STROKES}>");
        assert!(brush_kernel::BRUSH_SHADER.contains(&declaration));
    }

    #[test]
    fn test_ocean_fill_matches_codec() {
        assert_eq!(TerrainCell::OCEAN.raw(), encode_cell(TerrainType::Ocean, 0));
    }
}
