//! Brush strokes and the batched offscreen brush engine.
//!
//! Strokes queue up during a frame and are flushed together: every tile any
//! stroke of the batch touches is rendered exactly once, with all the strokes
//! that overlap it, then swapped and marked dirty. Renderers come from a
//! small pool and are reclaimed after sitting idle past their time-to-live.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use terra_common::{ChunkCoord, ChunkRect, RendererId, TerraResult, WorldCoord};
use tracing::{debug, error, warn};

use crate::backend::{BrushPass, StrokeKind, StrokeParams, TileBackend, MAX_BATCH_STROKES};
use crate::cell::{TerrainCell, TerrainType, MAX_MAGNITUDE};
use crate::grid::{ChunkGrid, CHUNK_SIZE};
use crate::pool::{PoolConfig, PoolStats, ResourcePool};

/// Smallest accepted brush radius.
pub const MIN_BRUSH_RADIUS: f32 = 1.0;

/// Largest accepted brush radius.
pub const MAX_BRUSH_RADIUS: f32 = 20.0;

/// Stroke centers are clamped into this range so chunk math cannot overflow.
const WORLD_LIMIT: f32 = 1.0e9;

/// Brush tool selected in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrushType {
    /// Stamp a terrain type
    Paint,
    /// Stamp ocean
    Erase,
    /// Average magnitudes
    Smooth,
    /// Increase magnitude
    Raise,
    /// Decrease magnitude
    Lower,
}

impl BrushType {
    /// All brush types.
    pub const ALL: [Self; 5] = [Self::Paint, Self::Erase, Self::Smooth, Self::Raise, Self::Lower];

    /// Lowercase display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Paint => "paint",
            Self::Erase => "erase",
            Self::Smooth => "smooth",
            Self::Raise => "raise",
            Self::Lower => "lower",
        }
    }
}

impl std::str::FromStr for BrushType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown brush type '{s}'"))
    }
}

/// A fully resolved brush operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushOp {
    /// Stamp `terrain` at `magnitude`
    Paint {
        /// Terrain to stamp
        terrain: TerrainType,
        /// Magnitude to stamp
        magnitude: u8,
    },
    /// Stamp the ocean fill
    Erase,
    /// Replace magnitude with the 3×3 mean
    Smooth,
    /// Add `amount` to magnitude
    Raise {
        /// Magnitude delta
        amount: u8,
    },
    /// Subtract `amount` from magnitude
    Lower {
        /// Magnitude delta
        amount: u8,
    },
}

impl BrushOp {
    /// Builds the operation for a tool, terrain value and magnitude.
    #[must_use]
    pub const fn new(brush_type: BrushType, terrain: TerrainType, magnitude: u8) -> Self {
        match brush_type {
            BrushType::Paint => Self::Paint { terrain, magnitude },
            BrushType::Erase => Self::Erase,
            BrushType::Smooth => Self::Smooth,
            BrushType::Raise => Self::Raise { amount: magnitude },
            BrushType::Lower => Self::Lower { amount: magnitude },
        }
    }

    /// The tool this operation belongs to.
    #[must_use]
    pub const fn brush_type(self) -> BrushType {
        match self {
            Self::Paint { .. } => BrushType::Paint,
            Self::Erase => BrushType::Erase,
            Self::Smooth => BrushType::Smooth,
            Self::Raise { .. } => BrushType::Raise,
            Self::Lower { .. } => BrushType::Lower,
        }
    }

    /// Kernel code, stamped value and magnitude delta for the brush shader.
    const fn kernel(self) -> (u32, u8, u8) {
        match self {
            Self::Paint { terrain, magnitude } => (
                StrokeKind::PAINT,
                TerrainCell::encode(terrain, magnitude).raw(),
                magnitude,
            ),
            Self::Erase => (StrokeKind::ERASE, TerrainCell::OCEAN.raw(), 0),
            Self::Smooth => (StrokeKind::SMOOTH, 0, 0),
            Self::Raise { amount } => (StrokeKind::RAISE, 0, amount),
            Self::Lower { amount } => (StrokeKind::LOWER, 0, amount),
        }
    }
}

/// A brush request as it arrives from the UI. Values are not yet clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushRequest {
    /// Stroke center x, in world cells
    pub world_x: f32,
    /// Stroke center y, in world cells
    pub world_y: f32,
    /// Stroke radius, in cells
    pub radius: f32,
    /// Selected tool
    pub brush_type: BrushType,
    /// Terrain stamped by [`BrushType::Paint`]
    pub terrain: TerrainType,
    /// Stamped magnitude or raise/lower amount
    pub magnitude: u8,
}

impl BrushRequest {
    /// Creates a request.
    #[must_use]
    pub const fn new(
        world_x: f32,
        world_y: f32,
        radius: f32,
        brush_type: BrushType,
        terrain: TerrainType,
        magnitude: u8,
    ) -> Self {
        Self {
            world_x,
            world_y,
            radius,
            brush_type,
            terrain,
            magnitude,
        }
    }

    /// Clamps the request into a stroke.
    ///
    /// Radius goes to [1, 20] and magnitude to [1, 31]. Returns `None` when a
    /// coordinate or the radius is not finite.
    #[must_use]
    pub fn to_stroke(&self, timestamp: u64) -> Option<BrushStroke> {
        if !(self.world_x.is_finite() && self.world_y.is_finite() && self.radius.is_finite()) {
            return None;
        }
        let radius = self.radius.clamp(MIN_BRUSH_RADIUS, MAX_BRUSH_RADIUS);
        let magnitude = self.magnitude.clamp(1, MAX_MAGNITUDE);
        if (radius - self.radius).abs() > f32::EPSILON || magnitude != self.magnitude {
            warn!(
                "Clamped brush request (radius {} -> {radius}, magnitude {} -> {magnitude})",
                self.radius, self.magnitude
            );
        }
        Some(BrushStroke {
            world_x: self.world_x.clamp(-WORLD_LIMIT, WORLD_LIMIT),
            world_y: self.world_y.clamp(-WORLD_LIMIT, WORLD_LIMIT),
            radius,
            op: BrushOp::new(self.brush_type, self.terrain, magnitude),
            timestamp,
        })
    }
}

/// A clamped stroke waiting in the batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushStroke {
    /// Center x, in world cells
    pub world_x: f32,
    /// Center y, in world cells
    pub world_y: f32,
    /// Radius in cells
    pub radius: f32,
    /// Operation applied inside the radius
    pub op: BrushOp,
    /// Arrival order
    pub timestamp: u64,
}

impl BrushStroke {
    /// Inclusive world-space bounding box of the cells the stroke can touch.
    #[must_use]
    pub fn bounds(&self) -> (WorldCoord, WorldCoord) {
        (
            WorldCoord::from_f32(self.world_x - self.radius, self.world_y - self.radius),
            WorldCoord::from_f32(self.world_x + self.radius, self.world_y + self.radius),
        )
    }

    /// Chunks whose bounds intersect [`Self::bounds`], unclamped.
    #[must_use]
    pub fn affected_chunks(&self) -> ChunkRect {
        let (min, max) = self.bounds();
        ChunkRect::from_world_box(min, max, CHUNK_SIZE)
    }

    /// Shader parameters for this stroke.
    #[must_use]
    pub fn params(&self) -> StrokeParams {
        let (kind, value, amount) = self.op.kernel();
        StrokeParams::new((self.world_x, self.world_y), self.radius, kind, value, amount)
    }
}

/// Where the current batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokePhase {
    /// No batch in flight
    #[default]
    Idle,
    /// Tiles touched by the batch are known
    AffectedTilesResolved,
    /// At least one tile has been rendered and swapped
    PerTileRendered,
    /// Every affected tile has the batch applied
    Committed,
}

/// Brush engine settings.
#[derive(Debug, Clone)]
pub struct BrushConfig {
    /// Most strokes carried by one batch
    pub max_batch: usize,
    /// Offscreen renderer pool; `max_idle_time` is the renderer time-to-live
    pub renderer_pool: PoolConfig,
    /// Renderers created up front
    pub prewarm_renderers: usize,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            max_batch: MAX_BATCH_STROKES,
            renderer_pool: PoolConfig {
                label: "offscreen-renderer",
                max_size: 4,
                max_idle_time: Duration::from_secs(10),
            },
            prewarm_renderers: 1,
        }
    }
}

/// Brush engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrushStats {
    /// Strokes accepted into the batch
    pub queued: u64,
    /// Requests dropped for non-finite input
    pub rejected: u64,
    /// Strokes applied by flushes
    pub flushed_strokes: u64,
    /// Non-empty flushes
    pub batches: u64,
    /// Single-tile render passes issued
    pub tile_passes: u64,
}

/// Batches brush strokes and renders them into grid tiles.
#[derive(Debug)]
pub struct BrushEngine {
    config: BrushConfig,
    pending: VecDeque<BrushStroke>,
    renderers: ResourcePool<RendererId>,
    phase: StrokePhase,
    next_timestamp: u64,
    stats: BrushStats,
}

impl BrushEngine {
    /// Creates an idle engine. The batch cap is limited to what one pass can carry.
    #[must_use]
    pub fn new(mut config: BrushConfig) -> Self {
        config.max_batch = config.max_batch.clamp(1, MAX_BATCH_STROKES);
        let renderers = ResourcePool::new(config.renderer_pool.clone());
        Self {
            config,
            pending: VecDeque::new(),
            renderers,
            phase: StrokePhase::Idle,
            next_timestamp: 0,
            stats: BrushStats::default(),
        }
    }

    /// Creates the configured number of idle renderers ahead of the first stroke.
    pub fn pre_warm<B: TileBackend>(&mut self, grid: &mut ChunkGrid<B>) -> TerraResult<usize> {
        self.renderers
            .pre_warm(grid.backend_mut(), self.config.prewarm_renderers)
    }

    /// Appends a stroke to the batch, flushing first if the batch is full.
    ///
    /// Returns `false` if the request was dropped for non-finite input.
    pub fn queue<B: TileBackend>(
        &mut self,
        grid: &mut ChunkGrid<B>,
        request: &BrushRequest,
    ) -> TerraResult<bool> {
        let Some(stroke) = request.to_stroke(self.next_timestamp) else {
            warn!("Dropping brush request with non-finite input: {request:?}");
            self.stats.rejected += 1;
            return Ok(false);
        };
        if self.pending.len() >= self.config.max_batch {
            self.flush(grid)?;
        }
        self.next_timestamp += 1;
        self.pending.push_back(stroke);
        self.stats.queued += 1;
        Ok(true)
    }

    /// Queues a stroke and flushes immediately. Returns the tiles rendered.
    pub fn paint<B: TileBackend>(
        &mut self,
        grid: &mut ChunkGrid<B>,
        request: &BrushRequest,
    ) -> TerraResult<usize> {
        if !self.queue(grid, request)? {
            return Ok(0);
        }
        self.flush(grid)
    }

    /// Applies the captured batch to every tile it touches.
    ///
    /// Each affected tile gets one pass carrying the batch's strokes that
    /// overlap it, in arrival order. Only the captured strokes are removed
    /// from the front of the queue afterwards. Returns the tiles rendered.
    pub fn flush<B: TileBackend>(&mut self, grid: &mut ChunkGrid<B>) -> TerraResult<usize> {
        let captured = self.pending.len().min(self.config.max_batch);
        if captured == 0 {
            return Ok(0);
        }
        self.phase = StrokePhase::Idle;
        let result = self.render_batch(grid, captured);
        self.pending.drain(..captured);
        self.stats.flushed_strokes += captured as u64;
        self.stats.batches += 1;
        match &result {
            Ok(tiles) => {
                self.phase = StrokePhase::Committed;
                debug!("Flushed {captured} strokes into {tiles} tiles");
            },
            Err(e) => error!("Brush batch of {captured} strokes failed: {e}"),
        }
        result
    }

    fn render_batch<B: TileBackend>(
        &mut self,
        grid: &mut ChunkGrid<B>,
        captured: usize,
    ) -> TerraResult<usize> {
        let batch: Vec<(ChunkRect, StrokeParams)> = self
            .pending
            .iter()
            .take(captured)
            .map(|s| (s.affected_chunks(), s.params()))
            .collect();

        let (grid_width, grid_height) = (grid.grid_width(), grid.grid_height());
        let affected: BTreeSet<ChunkCoord> = batch
            .iter()
            .filter_map(|(rect, _)| rect.clamp_to_grid(grid_width, grid_height))
            .flat_map(|rect| rect.iter())
            .collect();
        self.phase = StrokePhase::AffectedTilesResolved;

        let mut strokes = Vec::with_capacity(batch.len());
        for &coord in &affected {
            strokes.clear();
            strokes.extend(
                batch
                    .iter()
                    .filter(|(rect, _)| rect.contains(coord))
                    .map(|(_, params)| *params),
            );
            self.render_tile(grid, coord, &strokes)?;
            self.phase = StrokePhase::PerTileRendered;
        }
        Ok(affected.len())
    }

    fn render_tile<B: TileBackend>(
        &mut self,
        grid: &mut ChunkGrid<B>,
        coord: ChunkCoord,
        strokes: &[StrokeParams],
    ) -> TerraResult<()> {
        let Some(tile) = grid.get_or_create_tile(coord)? else {
            return Ok(());
        };
        let origin = coord.to_world_coord(CHUNK_SIZE);
        let renderer = self.renderers.acquire(grid.backend_mut())?;
        let pass = BrushPass {
            renderer,
            source: tile.read_target(),
            dest: tile.write_target(),
            origin: (origin.x as i32, origin.y as i32),
            strokes,
        };
        let rendered = grid.backend_mut().render_brush(&pass);
        self.renderers.release(grid.backend_mut(), renderer)?;
        rendered?;

        grid.swap_buffers(coord);
        grid.mark_dirty(coord);
        self.stats.tile_passes += 1;
        Ok(())
    }

    /// Destroys renderers idle past their time-to-live. Returns how many.
    pub fn collect_garbage<B: TileBackend>(&mut self, grid: &mut ChunkGrid<B>) -> usize {
        self.renderers.purge_idle(grid.backend_mut())
    }

    /// Drops queued strokes without applying them.
    pub fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending strokes", self.pending.len());
            self.pending.clear();
        }
        self.phase = StrokePhase::Idle;
    }

    /// Destroys every pooled renderer.
    pub fn dispose<B: TileBackend>(&mut self, grid: &mut ChunkGrid<B>) {
        self.pending.clear();
        self.renderers.dispose(grid.backend_mut());
    }

    /// Strokes waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Lifecycle phase of the last batch.
    #[must_use]
    pub const fn phase(&self) -> StrokePhase {
        self.phase
    }

    /// Engine counters.
    #[must_use]
    pub const fn stats(&self) -> BrushStats {
        self.stats
    }

    /// Renderer pool counters.
    #[must_use]
    pub fn renderer_stats(&self) -> PoolStats {
        self.renderers.stats()
    }
}
