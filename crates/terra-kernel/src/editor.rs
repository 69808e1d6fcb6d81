//! Frame-driven facade over grid, brush engine and culler.

use terra_common::{ChunkCoord, TerraResult, WorldCoord};
use tracing::{debug, info};

use crate::backend::TileBackend;
use crate::cell::TerrainCell;
use crate::brush::{BrushConfig, BrushEngine, BrushRequest, BrushStats};
use crate::cpu_backend::CpuBackend;
use crate::gpu_backend::WgpuBackend;
use crate::grid::{ChunkGrid, GridConfig, GridStats, CHUNK_SIZE};
use crate::pool::PoolStats;
use crate::raster::TerrainRaster;
use crate::viewport::{ViewTransform, ViewportCuller};

/// Engine settings.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Tile grid settings
    pub grid: GridConfig,
    /// Brush engine settings
    pub brush: BrushConfig,
}

/// What one [`TerrainEditor::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Tiles the flushed batch rendered into
    pub tiles_rendered: usize,
    /// Renderers reclaimed past their time-to-live
    pub renderers_collected: usize,
}

/// Combined engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditorStats {
    /// Grid counters
    pub grid: GridStats,
    /// Brush counters
    pub brush: BrushStats,
    /// Render target pool
    pub targets: PoolStats,
    /// Offscreen renderer pool
    pub renderers: PoolStats,
}

/// Terrain editing engine: one grid, one brush engine, one culler.
#[derive(Debug)]
pub struct TerrainEditor<B: TileBackend> {
    grid: ChunkGrid<B>,
    brush: BrushEngine,
    culler: ViewportCuller,
    frame: u64,
}

impl TerrainEditor<CpuBackend> {
    /// Editor on the CPU reference backend.
    pub fn cpu(config: EngineConfig) -> TerraResult<Self> {
        Self::new(CpuBackend::new(CHUNK_SIZE), config)
    }
}

impl TerrainEditor<WgpuBackend> {
    /// Editor on a headless wgpu device.
    pub fn headless_gpu(config: EngineConfig, force_fallback: bool) -> TerraResult<Self> {
        Self::new(WgpuBackend::new_headless(CHUNK_SIZE, force_fallback)?, config)
    }
}

impl<B: TileBackend> TerrainEditor<B> {
    /// Builds the engine on a backend and pre-warms the renderer pool.
    pub fn new(backend: B, config: EngineConfig) -> TerraResult<Self> {
        let mut grid = ChunkGrid::new(backend, config.grid)?;
        let mut brush = BrushEngine::new(config.brush);
        brush.pre_warm(&mut grid)?;
        info!("Terrain editor ready on {} backend", grid.backend().name());
        Ok(Self {
            grid,
            brush,
            culler: ViewportCuller::default(),
            frame: 0,
        })
    }

    /// Starts a fresh all-ocean map. Pending strokes are discarded.
    pub fn initialize(&mut self, width: u32, height: u32) -> TerraResult<()> {
        self.grid.initialize_grid(width, height)?;
        self.brush.discard_pending();
        self.culler = ViewportCuller::new(self.grid.grid_width(), self.grid.grid_height());
        Ok(())
    }

    /// Replaces the map with a raster. On error the previous map is kept.
    pub fn load_raster(&mut self, raster: &TerrainRaster) -> TerraResult<()> {
        self.grid.load_raster(raster)?;
        self.brush.discard_pending();
        self.culler = ViewportCuller::new(self.grid.grid_width(), self.grid.grid_height());
        info!(
            "Loaded {}x{} raster ({} land cells)",
            raster.width(),
            raster.height(),
            raster.land_tile_count()
        );
        Ok(())
    }

    /// Applies one stroke immediately, along with anything already queued.
    pub fn paint(&mut self, request: &BrushRequest) -> TerraResult<usize> {
        self.brush.paint(&mut self.grid, request)
    }

    /// Queues a stroke for the next [`Self::update`].
    pub fn queue_stroke(&mut self, request: &BrushRequest) -> TerraResult<bool> {
        self.brush.queue(&mut self.grid, request)
    }

    /// Per-frame tick: flushes queued strokes and reclaims idle renderers.
    pub fn update(&mut self) -> TerraResult<FrameReport> {
        self.frame += 1;
        let tiles_rendered = self.brush.flush(&mut self.grid)?;
        let renderers_collected = self.brush.collect_garbage(&mut self.grid);
        if tiles_rendered > 0 || renderers_collected > 0 {
            debug!(
                "Frame {}: {tiles_rendered} tiles rendered, {renderers_collected} renderers freed",
                self.frame
            );
        }
        Ok(FrameReport {
            frame: self.frame,
            tiles_rendered,
            renderers_collected,
        })
    }

    /// Tiles visible through a view, for the display pass.
    #[must_use]
    pub fn visible_tiles(
        &self,
        transform: &ViewTransform,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Vec<ChunkCoord> {
        self.culler.visible_tiles(transform, canvas_width, canvas_height)
    }

    /// The cell under a map position, for picking. `None` off the map.
    pub fn cell_at(&mut self, x: i64, y: i64) -> TerraResult<Option<TerrainCell>> {
        self.grid.cell_at(WorldCoord::new(x, y))
    }

    /// Full CPU copy of the map for persistence.
    pub fn snapshot(&mut self) -> TerraResult<TerrainRaster> {
        self.grid.snapshot()
    }

    /// Reads back one tile. `None` if it was never touched.
    pub fn extract_tile(&mut self, coord: ChunkCoord) -> TerraResult<Option<Vec<u8>>> {
        self.grid.extract_tile(coord)
    }

    /// Releases every GPU object the editor holds.
    pub fn dispose(&mut self) -> TerraResult<()> {
        self.brush.dispose(&mut self.grid);
        self.grid.dispose()
    }

    /// Map width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.grid.width()
    }

    /// Map height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.grid.height()
    }

    /// Frames ticked so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The tile grid.
    #[must_use]
    pub const fn grid(&self) -> &ChunkGrid<B> {
        &self.grid
    }

    /// The brush engine.
    #[must_use]
    pub const fn brush(&self) -> &BrushEngine {
        &self.brush
    }

    /// Combined counters.
    #[must_use]
    pub fn stats(&self) -> EditorStats {
        EditorStats {
            grid: self.grid.stats(),
            brush: self.brush.stats(),
            targets: self.grid.target_pool_stats(),
            renderers: self.brush.renderer_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushType;
    use crate::cell::TerrainType;
    use glam::Vec2;

    fn editor(width: u32, height: u32) -> TerrainEditor<CpuBackend> {
        let mut editor = TerrainEditor::cpu(EngineConfig::default()).expect("editor");
        editor.initialize(width, height).expect("init");
        editor
    }

    fn paint_at(x: f32, y: f32, terrain: TerrainType, magnitude: u8) -> BrushRequest {
        BrushRequest::new(x, y, 4.0, BrushType::Paint, terrain, magnitude)
    }

    #[test]
    fn test_queued_strokes_apply_on_update() {
        let mut editor = editor(128, 128);
        editor.queue_stroke(&paint_at(10.0, 10.0, TerrainType::Mountain, 25)).expect("queue");
        assert_eq!(editor.extract_tile(ChunkCoord::new(0, 0)).expect("extract"), None);

        let report = editor.update().expect("update");
        assert_eq!(report.frame, 1);
        assert_eq!(report.tiles_rendered, 1);
        let raster = editor.snapshot().expect("snapshot");
        assert_eq!(TerrainType::classify(raster.get(10, 10).expect("cell")), TerrainType::Mountain);

        assert_eq!(editor.update().expect("update").tiles_rendered, 0);
        assert_eq!(
            editor.cell_at(10, 10).expect("pick").map(TerrainType::classify),
            Some(TerrainType::Mountain)
        );
        assert_eq!(editor.cell_at(128, 0).expect("pick"), None);
    }

    #[test]
    fn test_resize_returns_targets_to_pool() {
        let mut editor = editor(1024, 1024);
        for i in 0..6 {
            let x = 32.0 + 64.0 * i as f32;
            editor.paint(&paint_at(x, 500.0, TerrainType::Plains, 3)).expect("paint");
        }
        let resident = editor.stats().grid.resident;
        assert_eq!(resident, 6);
        let available = editor.stats().targets.available;

        editor.initialize(512, 512).expect("resize");
        let stats = editor.stats();
        assert_eq!(stats.grid.resident, 0);
        assert_eq!(stats.targets.available, available + resident * 2);
        assert_eq!(stats.targets.in_use, 0);
        assert_eq!(editor.extract_tile(ChunkCoord::new(0, 7)).expect("extract"), None);
        let snapshot = editor.snapshot().expect("snapshot");
        assert!(snapshot.cells().iter().all(|&c| c == TerrainCell::OCEAN));
    }

    #[test]
    fn test_load_raster_then_edit() {
        let mut raster = TerrainRaster::new_ocean(80, 80).expect("raster");
        raster.set(70, 70, TerrainCell::encode(TerrainType::Lake, 2));
        let mut editor = editor(16, 16);
        editor.load_raster(&raster).expect("load");
        assert_eq!(editor.width(), 80);

        editor.paint(&paint_at(5.0, 5.0, TerrainType::Highland, 15)).expect("paint");
        let snapshot = editor.snapshot().expect("snapshot");
        assert_eq!(snapshot.get(70, 70), raster.get(70, 70));
        assert_eq!(TerrainType::classify(snapshot.get(5, 5).expect("cell")), TerrainType::Highland);
    }

    #[test]
    fn test_visible_tiles_follow_grid() {
        let editor = editor(256, 128);
        let tiles = editor.visible_tiles(&ViewTransform::new(Vec2::ZERO, 0.5), 4000, 4000);
        assert_eq!(tiles.len(), 4 * 2);
    }

    #[test]
    fn test_dispose_releases_backend_objects() {
        let mut editor = editor(128, 128);
        editor.paint(&paint_at(64.0, 64.0, TerrainType::Plains, 3)).expect("paint");
        editor.dispose().expect("dispose");
        assert_eq!(editor.grid().backend().live_targets(), 0);
        assert_eq!(editor.grid().backend().live_renderers(), 0);
    }
}
