//! Host-memory tile backend.
//!
//! Keeps every render target as a byte vector and runs the brush kernel on
//! the CPU. Output is byte-identical to the wgpu backend, which makes it the
//! reference for tests and the backend of choice when no adapter exists.

use std::collections::HashMap;

use terra_common::{GpuError, IdAllocator, RendererId, TargetId, TerraError, TerraResult};
use tracing::debug;

use crate::backend::{BrushPass, BrushUniform, TileBackend};
use crate::brush_kernel::rasterize_pass;
use crate::pool::ResourceFactory;

/// Per-renderer parameter storage.
#[derive(Debug)]
struct CpuRenderer {
    params: Box<BrushUniform>,
    draws: u64,
}

/// CPU implementation of [`TileBackend`].
#[derive(Debug)]
pub struct CpuBackend {
    tile_size: u32,
    ids: IdAllocator,
    targets: HashMap<TargetId, Vec<u8>>,
    renderers: HashMap<RendererId, CpuRenderer>,
}

impl CpuBackend {
    /// Creates a backend for `tile_size × tile_size` targets.
    #[must_use]
    pub fn new(tile_size: u32) -> Self {
        debug!("CPU tile backend created (tile_size={tile_size})");
        Self {
            tile_size,
            ids: IdAllocator::new(),
            targets: HashMap::new(),
            renderers: HashMap::new(),
        }
    }

    /// Number of live render targets.
    #[must_use]
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of live renderers.
    #[must_use]
    pub fn live_renderers(&self) -> usize {
        self.renderers.len()
    }

    /// Total draws issued through a renderer, if it is live.
    #[must_use]
    pub fn draw_count(&self, renderer: RendererId) -> Option<u64> {
        self.renderers.get(&renderer).map(|r| r.draws)
    }

    fn tile_len(&self) -> usize {
        (self.tile_size as usize) * (self.tile_size as usize)
    }

    fn target(&self, id: TargetId) -> TerraResult<&Vec<u8>> {
        self.targets
            .get(&id)
            .ok_or_else(|| GpuError::InvalidHandle(id.to_string()).into())
    }

    fn target_mut(&mut self, id: TargetId) -> TerraResult<&mut Vec<u8>> {
        self.targets
            .get_mut(&id)
            .ok_or_else(|| GpuError::InvalidHandle(id.to_string()).into())
    }
}

impl ResourceFactory<TargetId> for CpuBackend {
    fn create(&mut self) -> TerraResult<TargetId> {
        let id = self.ids.next_target();
        let len = self.tile_len();
        self.targets.insert(id, vec![0; len]);
        Ok(id)
    }

    fn is_valid(&self, resource: &TargetId) -> bool {
        self.targets.contains_key(resource)
    }

    fn destroy(&mut self, resource: TargetId) {
        self.targets.remove(&resource);
    }
}

impl ResourceFactory<RendererId> for CpuBackend {
    fn create(&mut self) -> TerraResult<RendererId> {
        let id = self.ids.next_renderer();
        self.renderers.insert(
            id,
            CpuRenderer {
                params: Box::new(bytemuck::Zeroable::zeroed()),
                draws: 0,
            },
        );
        Ok(id)
    }

    fn is_valid(&self, resource: &RendererId) -> bool {
        self.renderers.contains_key(resource)
    }

    fn destroy(&mut self, resource: RendererId) {
        self.renderers.remove(&resource);
    }
}

impl TileBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn fill_target(&mut self, target: TargetId, value: u8) -> TerraResult<()> {
        self.target_mut(target)?.fill(value);
        Ok(())
    }

    fn upload_target(&mut self, target: TargetId, bytes: &[u8]) -> TerraResult<()> {
        let expected = self.tile_len();
        if bytes.len() != expected {
            return Err(GpuError::UploadSize {
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        self.target_mut(target)?.copy_from_slice(bytes);
        Ok(())
    }

    fn read_target(&mut self, target: TargetId) -> TerraResult<Vec<u8>> {
        self.target(target).cloned()
    }

    fn render_brush(&mut self, pass: &BrushPass<'_>) -> TerraResult<()> {
        if pass.source == pass.dest {
            return Err(TerraError::PoolInvariant(format!(
                "brush pass reads and writes {}",
                pass.source
            )));
        }
        let tile_size = self.tile_size;
        let uniform = BrushUniform::from_pass(pass, tile_size);
        let renderer = self
            .renderers
            .get_mut(&pass.renderer)
            .ok_or_else(|| GpuError::InvalidHandle(pass.renderer.to_string()))?;
        *renderer.params = uniform;
        renderer.draws += 1;

        let count = uniform.header[2] as usize;
        let source = self.target(pass.source)?.clone();
        let dest = self.target_mut(pass.dest)?;
        rasterize_pass(&source, dest, tile_size, pass.origin, &uniform.strokes[..count]);
        Ok(())
    }
}
