//! Tiled GPU storage for the terrain raster.
//!
//! The raster is split into `CHUNK_SIZE × CHUNK_SIZE` tiles. A tile only gets
//! render targets the first time something touches it, and the number of
//! resident tiles is capped: past the cap, the least recently accessed tiles
//! are evicted and their targets go back to the pool. Edited tiles are read
//! back into a CPU backing page before eviction so nothing painted is lost.

use std::collections::HashMap;
use std::time::Duration;

use terra_common::{ChunkCoord, TargetId, TerraError, TerraResult, WorldCoord};
use tracing::{debug, info};

use crate::backend::TileBackend;
use crate::cell::TerrainCell;
use crate::pool::{PoolConfig, PoolStats, ResourcePool};
use crate::raster::TerrainRaster;

/// Tile edge length in cells.
pub const CHUNK_SIZE: u32 = 64;

/// Default cap on resident tiles.
pub const DEFAULT_MAX_ACTIVE_CHUNKS: usize = 256;

/// Grid settings.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Most tiles kept resident at once
    pub max_active_chunks: usize,
    /// Render target pool settings. Sized for two targets per tile plus one
    /// spare pair, so creating a tile at the cap never hits the escape valve.
    pub target_pool: PoolConfig,
    /// Targets created up front on [`ChunkGrid::new`]
    pub prewarm_targets: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_active_chunks: DEFAULT_MAX_ACTIVE_CHUNKS,
            target_pool: PoolConfig {
                label: "render-target",
                max_size: (DEFAULT_MAX_ACTIVE_CHUNKS + 1) * 2,
                max_idle_time: Duration::from_secs(30),
            },
            prewarm_targets: 0,
        }
    }
}

/// A resident tile: a read/write target pair plus bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    coord: ChunkCoord,
    read: TargetId,
    write: TargetId,
    dirty: bool,
    last_access: u64,
}

impl Tile {
    /// Chunk coordinate of the tile.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Target holding the current content.
    #[must_use]
    pub const fn read_target(&self) -> TargetId {
        self.read
    }

    /// Target the next brush pass renders into.
    #[must_use]
    pub const fn write_target(&self) -> TargetId {
        self.write
    }

    /// Whether the tile changed since it was created or restored.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Access tick of the last [`ChunkGrid::get_or_create_tile`] hit.
    #[must_use]
    pub const fn last_access(&self) -> u64 {
        self.last_access
    }
}

/// Grid counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Tiles with render targets
    pub resident: usize,
    /// Tiles held only as CPU backing pages
    pub spilled: usize,
    /// Tiles evicted since the grid was created
    pub evicted: u64,
    /// Tiles materialized from the ocean fill
    pub created: u64,
    /// Tiles materialized from a backing page
    pub restored: u64,
}

/// Lazily materialized, LRU-capped tile grid.
#[derive(Debug)]
pub struct ChunkGrid<B: TileBackend> {
    backend: B,
    targets: ResourcePool<TargetId>,
    tiles: HashMap<ChunkCoord, Tile>,
    backing: HashMap<ChunkCoord, Vec<u8>>,
    config: GridConfig,
    width: u32,
    height: u32,
    grid_width: u32,
    grid_height: u32,
    tick: u64,
    stats: GridStats,
}

impl<B: TileBackend> ChunkGrid<B> {
    /// Creates an empty grid over a backend. Call [`Self::initialize_grid`] before use.
    pub fn new(mut backend: B, config: GridConfig) -> TerraResult<Self> {
        if config.max_active_chunks == 0 {
            return Err(TerraError::Configuration(
                "max_active_chunks must be at least 1".into(),
            ));
        }
        if backend.tile_size() != CHUNK_SIZE {
            return Err(TerraError::Configuration(format!(
                "backend tile size {} does not match chunk size {CHUNK_SIZE}",
                backend.tile_size()
            )));
        }
        let mut targets = ResourcePool::new(config.target_pool.clone());
        targets.pre_warm(&mut backend, config.prewarm_targets)?;
        info!(
            "Chunk grid created on {} backend (max {} active chunks)",
            backend.name(),
            config.max_active_chunks
        );
        Ok(Self {
            backend,
            targets,
            tiles: HashMap::new(),
            backing: HashMap::new(),
            config,
            width: 0,
            height: 0,
            grid_width: 0,
            grid_height: 0,
            tick: 0,
            stats: GridStats::default(),
        })
    }

    /// Resets the grid to an all-ocean `width × height` raster.
    ///
    /// Every resident tile's targets go back to the pool and all backing
    /// pages are dropped.
    pub fn initialize_grid(&mut self, width: u32, height: u32) -> TerraResult<()> {
        if width == 0 || height == 0 {
            return Err(TerraError::Configuration(format!(
                "grid must be at least 1x1, got {width}x{height}"
            )));
        }
        self.release_all()?;
        self.backing.clear();
        self.width = width;
        self.height = height;
        self.grid_width = width.div_ceil(CHUNK_SIZE);
        self.grid_height = height.div_ceil(CHUNK_SIZE);
        info!(
            "Grid initialized: {width}x{height} cells, {}x{} chunks",
            self.grid_width, self.grid_height
        );
        Ok(())
    }

    /// Replaces the grid with the contents of a raster.
    ///
    /// The raster is paged up front; the old grid is only torn down once
    /// paging succeeded. Tiles upload lazily on first access.
    pub fn load_raster(&mut self, raster: &TerrainRaster) -> TerraResult<()> {
        let grid_width = raster.width().div_ceil(CHUNK_SIZE);
        let grid_height = raster.height().div_ceil(CHUNK_SIZE);
        let ocean = TerrainCell::OCEAN.raw();
        let mut pages = HashMap::new();
        for cy in 0..grid_height {
            for cx in 0..grid_width {
                let page = raster.read_region(
                    cx * CHUNK_SIZE,
                    cy * CHUNK_SIZE,
                    CHUNK_SIZE,
                    TerrainCell::OCEAN,
                );
                if page.iter().any(|&b| b != ocean) {
                    pages.insert(ChunkCoord::new(cx as i32, cy as i32), page);
                }
            }
        }

        self.initialize_grid(raster.width(), raster.height())?;
        debug!("Loaded {} non-ocean pages", pages.len());
        self.backing = pages;
        Ok(())
    }

    /// Returns the tile at `coord`, materializing it if needed.
    ///
    /// `None` outside the grid. A new tile is restored from its backing page
    /// when one exists, otherwise filled with ocean. Creating a tile past the
    /// cap evicts the least recently accessed tiles.
    pub fn get_or_create_tile(&mut self, coord: ChunkCoord) -> TerraResult<Option<Tile>> {
        if !self.contains(coord) {
            return Ok(None);
        }
        self.tick += 1;
        if let Some(tile) = self.tiles.get_mut(&coord) {
            tile.last_access = self.tick;
            return Ok(Some(*tile));
        }

        let read = self.targets.acquire(&mut self.backend)?;
        let write = match self.targets.acquire(&mut self.backend) {
            Ok(write) => write,
            Err(e) => {
                self.targets.release(&mut self.backend, read)?;
                return Err(e);
            },
        };
        if let Err(e) = self.initialize_targets(coord, read, write) {
            self.targets.release(&mut self.backend, read)?;
            self.targets.release(&mut self.backend, write)?;
            return Err(e);
        }

        let tile = Tile {
            coord,
            read,
            write,
            dirty: false,
            last_access: self.tick,
        };
        self.tiles.insert(coord, tile);
        debug!("Materialized tile {coord}");

        self.evict_over_cap()?;
        Ok(Some(tile))
    }

    fn initialize_targets(
        &mut self,
        coord: ChunkCoord,
        read: TargetId,
        write: TargetId,
    ) -> TerraResult<()> {
        if let Some(page) = self.backing.get(&coord) {
            self.backend.upload_target(read, page)?;
            self.backend.upload_target(write, page)?;
            self.stats.restored += 1;
        } else {
            let ocean = TerrainCell::OCEAN.raw();
            self.backend.fill_target(read, ocean)?;
            self.backend.fill_target(write, ocean)?;
            self.stats.created += 1;
        }
        Ok(())
    }

    fn evict_over_cap(&mut self) -> TerraResult<()> {
        let cap = self.config.max_active_chunks;
        if self.tiles.len() <= cap {
            return Ok(());
        }
        let mut by_age: Vec<(u64, ChunkCoord)> =
            self.tiles.values().map(|t| (t.last_access, t.coord)).collect();
        by_age.sort_unstable();
        let excess = self.tiles.len() - cap;
        for &(_, coord) in by_age.iter().take(excess) {
            self.evict_tile(coord)?;
        }
        Ok(())
    }

    fn evict_tile(&mut self, coord: ChunkCoord) -> TerraResult<()> {
        let Some(tile) = self.tiles.get(&coord).copied() else {
            return Ok(());
        };
        if tile.dirty {
            let page = self.backend.read_target(tile.read)?;
            self.backing.insert(coord, page);
        }
        self.tiles.remove(&coord);
        self.targets.release(&mut self.backend, tile.read)?;
        self.targets.release(&mut self.backend, tile.write)?;
        self.stats.evicted += 1;
        debug!("Evicted tile {coord} (spilled: {})", tile.dirty);
        Ok(())
    }

    /// Reads back a tile's current content.
    ///
    /// Resident content wins over a backing page. `None` when the tile was
    /// never materialized or loaded; the caller substitutes the ocean fill.
    pub fn extract_tile(&mut self, coord: ChunkCoord) -> TerraResult<Option<Vec<u8>>> {
        if let Some(tile) = self.tiles.get(&coord) {
            let read = tile.read;
            return self.backend.read_target(read).map(Some);
        }
        Ok(self.backing.get(&coord).cloned())
    }

    /// Reads the cell at a world position. `None` outside the raster.
    pub fn cell_at(&mut self, world: WorldCoord) -> TerraResult<Option<TerrainCell>> {
        if world.x < 0
            || world.y < 0
            || world.x >= i64::from(self.width)
            || world.y >= i64::from(self.height)
        {
            return Ok(None);
        }
        let coord = world.to_chunk_coord(CHUNK_SIZE);
        let index = world.to_local_coord(CHUNK_SIZE).to_index(CHUNK_SIZE);
        let cell = self
            .extract_tile(coord)?
            .and_then(|page| page.get(index).copied())
            .map_or(TerrainCell::OCEAN, TerrainCell);
        Ok(Some(cell))
    }

    /// Exchanges a tile's read and write targets. Returns `false` if the tile is not resident.
    pub fn swap_buffers(&mut self, coord: ChunkCoord) -> bool {
        let Some(tile) = self.tiles.get_mut(&coord) else {
            return false;
        };
        std::mem::swap(&mut tile.read, &mut tile.write);
        true
    }

    /// Flags a tile as edited so eviction spills it.
    pub fn mark_dirty(&mut self, coord: ChunkCoord) -> bool {
        let Some(tile) = self.tiles.get_mut(&coord) else {
            return false;
        };
        tile.dirty = true;
        true
    }

    /// Copies the whole grid into a CPU raster in one pass.
    ///
    /// Tiles never touched read as ocean and edge tiles are cropped.
    pub fn snapshot(&mut self) -> TerraResult<TerrainRaster> {
        let mut raster = TerrainRaster::new_ocean(self.width, self.height)?;
        for cy in 0..self.grid_height {
            for cx in 0..self.grid_width {
                let coord = ChunkCoord::new(cx as i32, cy as i32);
                if let Some(page) = self.extract_tile(coord)? {
                    raster.write_region(cx * CHUNK_SIZE, cy * CHUNK_SIZE, CHUNK_SIZE, &page);
                }
            }
        }
        raster.recount_land();
        Ok(raster)
    }

    /// Releases every tile and disposes the target pool.
    pub fn dispose(&mut self) -> TerraResult<()> {
        self.release_all()?;
        self.backing.clear();
        self.targets.dispose(&mut self.backend);
        Ok(())
    }

    fn release_all(&mut self) -> TerraResult<()> {
        let count = self.tiles.len();
        for (_, tile) in self.tiles.drain() {
            self.targets.release(&mut self.backend, tile.read)?;
            self.targets.release(&mut self.backend, tile.write)?;
        }
        if count > 0 {
            debug!("Released {count} tiles to the pool");
        }
        Ok(())
    }

    /// Whether `coord` lies inside the grid.
    #[must_use]
    pub const fn contains(&self, coord: ChunkCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && (coord.x as u32) < self.grid_width
            && (coord.y as u32) < self.grid_height
    }

    /// A resident tile, without touching its access time.
    #[must_use]
    pub fn tile(&self, coord: ChunkCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    /// Number of resident tiles.
    #[must_use]
    pub fn active_tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Raster width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Raster height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Grid width in chunks.
    #[must_use]
    pub const fn grid_width(&self) -> u32 {
        self.grid_width
    }

    /// Grid height in chunks.
    #[must_use]
    pub const fn grid_height(&self) -> u32 {
        self.grid_height
    }

    /// Grid settings.
    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Tile device.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Tile device, mutably. Brush rendering and the renderer pool go through this.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Render target pool counters.
    #[must_use]
    pub fn target_pool_stats(&self) -> PoolStats {
        self.targets.stats()
    }

    /// Grid counters.
    #[must_use]
    pub fn stats(&self) -> GridStats {
        GridStats {
            resident: self.tiles.len(),
            spilled: self.backing.keys().filter(|c| !self.tiles.contains_key(c)).count(),
            ..self.stats
        }
    }
}
