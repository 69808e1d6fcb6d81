//! Device seam for tile storage and brush rendering.
//!
//! The engine talks to the GPU only through [`TileBackend`]. Two backends
//! exist: [`crate::gpu_backend::WgpuBackend`] renders on the device, and
//! [`crate::cpu_backend::CpuBackend`] is a byte-exact reference used by tests
//! and headless tools.

use bytemuck::{Pod, Zeroable};
use terra_common::{RendererId, TargetId, TerraResult};

use crate::pool::ResourceFactory;

/// Maximum strokes one brush pass can carry.
pub const MAX_BATCH_STROKES: usize = 256;

/// Stroke kernel codes shared with the brush shader.
pub struct StrokeKind;

impl StrokeKind {
    /// Stamp a fixed cell value
    pub const PAINT: u32 = 0;
    /// Stamp the ocean fill
    pub const ERASE: u32 = 1;
    /// Average neighbouring magnitudes
    pub const SMOOTH: u32 = 2;
    /// Add to magnitude
    pub const RAISE: u32 = 3;
    /// Subtract from magnitude
    pub const LOWER: u32 = 4;
}

/// Per-stroke draw parameters, laid out for a WGSL uniform array.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct StrokeParams {
    /// Center x, center y, radius, unused
    pub shape: [f32; 4],
    /// Kernel code, stamped cell value, magnitude delta, unused
    pub op: [u32; 4],
}

impl StrokeParams {
    /// Creates parameters for one stroke.
    #[must_use]
    pub const fn new(center: (f32, f32), radius: f32, kind: u32, value: u8, amount: u8) -> Self {
        Self {
            shape: [center.0, center.1, radius, 0.0],
            op: [kind, value as u32, amount as u32, 0],
        }
    }

    /// Whether the cell at integer world coordinates lies inside the stroke.
    #[must_use]
    pub fn covers(&self, x: i64, y: i64) -> bool {
        let dx = x as f32 - self.shape[0];
        let dy = y as f32 - self.shape[1];
        dx * dx + dy * dy <= self.shape[2] * self.shape[2]
    }
}

/// Uniform block uploaded for one brush pass.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BrushUniform {
    /// Tile origin x, tile origin y, stroke count, tile size
    pub header: [i32; 4],
    /// Stroke slots; only the first `header[2]` are read
    pub strokes: [StrokeParams; MAX_BATCH_STROKES],
}

impl BrushUniform {
    /// Packs a pass into uniform layout. Strokes beyond the cap are dropped.
    #[must_use]
    pub fn from_pass(pass: &BrushPass<'_>, tile_size: u32) -> Self {
        let mut uniform = Self::zeroed();
        let count = pass.strokes.len().min(MAX_BATCH_STROKES);
        uniform.header = [pass.origin.0, pass.origin.1, count as i32, tile_size as i32];
        uniform.strokes[..count].copy_from_slice(&pass.strokes[..count]);
        uniform
    }
}

/// One offscreen brush draw into a single tile.
///
/// Reads `source`, writes `dest`; the two must be distinct targets.
#[derive(Debug, Clone, Copy)]
pub struct BrushPass<'a> {
    /// Renderer whose parameter storage carries this draw
    pub renderer: RendererId,
    /// Tile read texture
    pub source: TargetId,
    /// Tile write texture
    pub dest: TargetId,
    /// World coordinate of the tile's top-left cell
    pub origin: (i32, i32),
    /// Strokes in arrival order
    pub strokes: &'a [StrokeParams],
}

/// Storage and rendering device for square terrain tiles.
pub trait TileBackend: ResourceFactory<TargetId> + ResourceFactory<RendererId> {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Edge length of every render target, in cells.
    fn tile_size(&self) -> u32;

    /// Sets every cell of a target to `value`.
    fn fill_target(&mut self, target: TargetId, value: u8) -> TerraResult<()>;

    /// Replaces a target's contents with `tile_size²` row-major bytes.
    fn upload_target(&mut self, target: TargetId, bytes: &[u8]) -> TerraResult<()>;

    /// Copies a target's contents back to the CPU.
    fn read_target(&mut self, target: TargetId) -> TerraResult<Vec<u8>>;

    /// Renders one brush pass.
    fn render_brush(&mut self, pass: &BrushPass<'_>) -> TerraResult<()>;
}
