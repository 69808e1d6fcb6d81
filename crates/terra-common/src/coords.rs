//! Coordinate types for world, chunk, and local positions.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// World coordinate in cells (global raster position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct WorldCoord {
    /// X coordinate in world space
    pub x: i64,
    /// Y coordinate in world space
    pub y: i64,
}

impl WorldCoord {
    /// Creates a new world coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Floors a fractional world position onto the cell that contains it.
    #[must_use]
    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: x.floor() as i64,
            y: y.floor() as i64,
        }
    }

    /// Converts to chunk coordinate given chunk size.
    #[must_use]
    pub const fn to_chunk_coord(self, chunk_size: u32) -> ChunkCoord {
        let size = chunk_size as i64;
        ChunkCoord {
            x: self.x.div_euclid(size) as i32,
            y: self.y.div_euclid(size) as i32,
        }
    }

    /// Converts to local coordinate within a chunk.
    #[must_use]
    pub const fn to_local_coord(self, chunk_size: u32) -> LocalCoord {
        let size = chunk_size as i64;
        LocalCoord {
            x: self.x.rem_euclid(size) as u16,
            y: self.y.rem_euclid(size) as u16,
        }
    }
}

/// Chunk coordinate (identifies a tile in the grid).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Converts to world coordinate (top-left corner of chunk).
    #[must_use]
    pub const fn to_world_coord(self, chunk_size: u32) -> WorldCoord {
        WorldCoord {
            x: (self.x as i64) * (chunk_size as i64),
            y: (self.y as i64) * (chunk_size as i64),
        }
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Local coordinate within a chunk (0 to chunk_size-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct LocalCoord {
    /// X coordinate within chunk
    pub x: u16,
    /// Y coordinate within chunk
    pub y: u16,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Converts to linear index for array access.
    #[must_use]
    pub const fn to_index(self, chunk_size: u32) -> usize {
        (self.y as usize) * (chunk_size as usize) + (self.x as usize)
    }
}

/// Inclusive rectangle of chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRect {
    /// Top-left chunk (inclusive)
    pub min: ChunkCoord,
    /// Bottom-right chunk (inclusive)
    pub max: ChunkCoord,
}

impl ChunkRect {
    /// Creates the rectangle spanning two corners.
    #[must_use]
    pub const fn new(min: ChunkCoord, max: ChunkCoord) -> Self {
        Self { min, max }
    }

    /// Chunk rectangle covering the inclusive world-space box.
    #[must_use]
    pub fn from_world_box(min: WorldCoord, max: WorldCoord, chunk_size: u32) -> Self {
        Self {
            min: min.to_chunk_coord(chunk_size),
            max: max.to_chunk_coord(chunk_size),
        }
    }

    /// Intersects with `[0, grid_width) × [0, grid_height)`.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the grid.
    #[must_use]
    pub fn clamp_to_grid(self, grid_width: u32, grid_height: u32) -> Option<Self> {
        if grid_width == 0 || grid_height == 0 {
            return None;
        }
        let max_x = grid_width as i32 - 1;
        let max_y = grid_height as i32 - 1;
        if self.max.x < 0 || self.max.y < 0 || self.min.x > max_x || self.min.y > max_y {
            return None;
        }
        let clamped = Self {
            min: ChunkCoord::new(self.min.x.max(0), self.min.y.max(0)),
            max: ChunkCoord::new(self.max.x.min(max_x), self.max.y.min(max_y)),
        };
        (!clamped.is_empty()).then_some(clamped)
    }

    /// Whether the rectangle contains no chunks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Whether a chunk lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, coord: ChunkCoord) -> bool {
        coord.x >= self.min.x
            && coord.x <= self.max.x
            && coord.y >= self.min.y
            && coord.y <= self.max.y
    }

    /// Number of chunks in the rectangle.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        ((self.max.x - self.min.x + 1) as usize) * ((self.max.y - self.min.y + 1) as usize)
    }

    /// Iterates chunks row by row.
    pub fn iter(&self) -> impl Iterator<Item = ChunkCoord> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| ChunkCoord::new(x, y)))
    }
}
