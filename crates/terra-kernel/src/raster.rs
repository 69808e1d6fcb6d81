//! Full-map terrain raster and its derived shoreline metadata.

use terra_common::{TerraError, TerraResult};
use tracing::debug;

use crate::cell::{CellBits, TerrainCell};

/// Row-major terrain raster with a cached land count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainRaster {
    width: u32,
    height: u32,
    cells: Vec<TerrainCell>,
    land_tile_count: u32,
}

impl TerrainRaster {
    /// Creates an all-ocean raster.
    pub fn new_ocean(width: u32, height: u32) -> TerraResult<Self> {
        Self::filled(width, height, TerrainCell::OCEAN)
    }

    /// Creates a raster where every cell has the same value.
    pub fn filled(width: u32, height: u32, cell: TerrainCell) -> TerraResult<Self> {
        let len = checked_len(width, height)?;
        let mut raster = Self {
            width,
            height,
            cells: vec![cell; len],
            land_tile_count: 0,
        };
        raster.recount_land();
        Ok(raster)
    }

    /// Wraps raw packed bytes.
    ///
    /// Fails with `CorruptedData` when the byte count does not match the size.
    pub fn from_bytes(width: u32, height: u32, bytes: Vec<u8>) -> TerraResult<Self> {
        let len = checked_len(width, height)?;
        if bytes.len() != len {
            return Err(TerraError::CorruptedData(format!(
                "raster {width}x{height} needs {len} bytes, got {}",
                bytes.len()
            )));
        }
        let mut raster = Self {
            width,
            height,
            cells: bytes.into_iter().map(TerrainCell).collect(),
            land_tile_count: 0,
        };
        raster.recount_land();
        Ok(raster)
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

    /// Number of cells with the land bit set.
    #[must_use]
    pub const fn land_tile_count(&self) -> u32 {
        self.land_tile_count
    }

    /// Packed bytes in row-major order.
    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cells)
    }

    /// Cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[TerrainCell] {
        &self.cells
    }

    /// Consumes the raster, returning its packed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.cells.into_iter().map(TerrainCell::raw).collect()
    }

    /// Gets a cell. `None` outside the raster.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<TerrainCell> {
        self.index(x, y).map(|i| self.cells[i])
    }

    /// Sets a cell, keeping the land count current. Returns `false` outside the raster.
    pub fn set(&mut self, x: u32, y: u32, cell: TerrainCell) -> bool {
        let Some(index) = self.index(x, y) else {
            return false;
        };
        let old = std::mem::replace(&mut self.cells[index], cell);
        match (old.is_land(), cell.is_land()) {
            (false, true) => self.land_tile_count += 1,
            (true, false) => self.land_tile_count -= 1,
            _ => {},
        }
        true
    }

    /// Recomputes the cached land count.
    pub fn recount_land(&mut self) -> u32 {
        self.land_tile_count = self.cells.iter().filter(|c| c.is_land()).count() as u32;
        self.land_tile_count
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + x as usize)
    }

    fn is_land_at(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.cells[(y as usize) * (self.width as usize) + x as usize].is_land()
    }

    /// Marks every water cell that touches land (4-connected) as shore.
    ///
    /// Shore cells get a magnitude of at least 1. The shore bit is derived
    /// from land adjacency alone, so applying this twice changes nothing.
    #[must_use]
    pub fn synthesize_shores(&self) -> Self {
        let mut out = self.clone();
        let mut marked = 0usize;
        for y in 0..i64::from(self.height) {
            for x in 0..i64::from(self.width) {
                let index = (y as usize) * (self.width as usize) + x as usize;
                let cell = self.cells[index];
                if cell.is_land() {
                    continue;
                }
                let touches_land = self.is_land_at(x, y - 1)
                    || self.is_land_at(x, y + 1)
                    || self.is_land_at(x - 1, y)
                    || self.is_land_at(x + 1, y);
                if touches_land {
                    out.cells[index] = cell
                        .with_flag(CellBits::SHORE)
                        .with_magnitude(cell.magnitude().max(1));
                    marked += 1;
                }
            }
        }
        debug!("Synthesized {marked} shore cells");
        out
    }

    /// Strips all shore bits, restoring the pre-synthesis water classification.
    ///
    /// Ocean shore cells become plain ocean cells and lake shores become lakes.
    /// Magnitude is preserved. Only the shore bit is cleared, so
    /// `remove_shores(synthesize_shores(r))` classifies every cell of `r` the
    /// same as before; rewriting lake shores as ocean would not.
    #[must_use]
    pub fn remove_shores(&self) -> Self {
        let mut out = self.clone();
        for cell in &mut out.cells {
            *cell = cell.without_flag(CellBits::SHORE);
        }
        out
    }

    /// Nearest-neighbour downsample by an integer factor (rounded up).
    pub fn downsample(&self, factor: u32) -> TerraResult<Self> {
        if factor == 0 {
            return Err(TerraError::Configuration("downsample factor must be >= 1".into()));
        }
        let width = self.width.div_ceil(factor);
        let height = self.height.div_ceil(factor);
        let mut cells = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                let sx = (x * factor).min(self.width - 1);
                let sy = (y * factor).min(self.height - 1);
                cells.push(self.cells[(sy as usize) * (self.width as usize) + sx as usize]);
            }
        }
        let mut raster = Self {
            width,
            height,
            cells,
            land_tile_count: 0,
        };
        raster.recount_land();
        Ok(raster)
    }

    /// Copies the square region at (`origin_x`, `origin_y`) into a `size × size` page.
    ///
    /// Parts of the page beyond the raster edge are filled with `pad`.
    #[must_use]
    pub fn read_region(
        &self,
        origin_x: u32,
        origin_y: u32,
        size: u32,
        pad: TerrainCell,
    ) -> Vec<u8> {
        let mut page = vec![pad.raw(); (size as usize) * (size as usize)];
        for row in 0..size {
            let y = origin_y + row;
            if y >= self.height || origin_x >= self.width {
                break;
            }
            let span = size.min(self.width - origin_x) as usize;
            let src = (y as usize) * (self.width as usize) + origin_x as usize;
            let dst = (row as usize) * (size as usize);
            page[dst..dst + span].copy_from_slice(&self.raw_bytes()[src..src + span]);
        }
        page
    }

    /// Writes a `size × size` page at (`origin_x`, `origin_y`), cropping at the raster edge.
    ///
    /// Does not touch the land count; call [`Self::recount_land`] after bulk writes.
    pub fn write_region(&mut self, origin_x: u32, origin_y: u32, size: u32, page: &[u8]) {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.cells);
        for row in 0..size {
            let y = origin_y + row;
            if y >= self.height || origin_x >= self.width {
                break;
            }
            let span = size.min(self.width - origin_x) as usize;
            let dst = (y as usize) * (self.width as usize) + origin_x as usize;
            let src = (row as usize) * (size as usize);
            bytes[dst..dst + span].copy_from_slice(&page[src..src + span]);
        }
    }
}

fn checked_len(width: u32, height: u32) -> TerraResult<usize> {
    if width == 0 || height == 0 {
        return Err(TerraError::Configuration(format!(
            "raster must be at least 1x1, got {width}x{height}"
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| TerraError::Configuration(format!("raster {width}x{height} is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TerrainType;
    use proptest::prelude::*;

    fn island() -> TerrainRaster {
        let mut raster = TerrainRaster::new_ocean(5, 5).expect("raster");
        raster.set(2, 2, TerrainCell::encode(TerrainType::Plains, 4));
        raster
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            TerrainRaster::new_ocean(0, 10),
            Err(TerraError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_bytes_length_checked() {
        assert!(matches!(
            TerrainRaster::from_bytes(4, 4, vec![0; 15]),
            Err(TerraError::CorruptedData(_))
        ));
        let raster = TerrainRaster::from_bytes(2, 1, vec![0x85, 0x20]).expect("raster");
        assert_eq!(raster.land_tile_count(), 1);
    }

    #[test]
    fn test_set_tracks_land_count() {
        let mut raster = island();
        assert_eq!(raster.land_tile_count(), 1);
        raster.set(0, 0, TerrainCell::encode(TerrainType::Mountain, 22));
        assert_eq!(raster.land_tile_count(), 2);
        raster.set(2, 2, TerrainCell::OCEAN);
        assert_eq!(raster.land_tile_count(), 1);
        assert!(!raster.set(5, 0, TerrainCell::OCEAN));
    }

    #[test]
    fn test_shores_around_island() {
        let shored = island().synthesize_shores();
        for (x, y) in [(2, 1), (2, 3), (1, 2), (3, 2)] {
            let cell = shored.get(x, y).expect("in bounds");
            assert!(cell.is_shore(), "({x},{y}) should be shore");
            assert_eq!(cell.magnitude(), 1);
        }
        assert!(!shored.get(1, 1).expect("in bounds").is_shore());
        assert!(!shored.get(2, 2).expect("in bounds").is_shore());
    }

    #[test]
    fn test_lake_shore_round_trip() {
        let mut raster = island();
        raster.set(2, 1, TerrainCell::encode(TerrainType::Lake, 3));
        let restored = raster.synthesize_shores().remove_shores();
        assert_eq!(TerrainType::classify(restored.get(2, 1).expect("cell")), TerrainType::Lake);
        assert_eq!(restored.get(2, 1).expect("cell").magnitude(), 3);
    }

    #[test]
    fn test_downsample_by_two() {
        let mut raster = TerrainRaster::new_ocean(5, 3).expect("raster");
        raster.set(2, 2, TerrainCell::encode(TerrainType::Plains, 1));
        raster.set(1, 1, TerrainCell::encode(TerrainType::Plains, 1));
        let mini = raster.downsample(2).expect("downsample");
        assert_eq!((mini.width(), mini.height()), (3, 2));
        assert_eq!(mini.land_tile_count(), 1);
        assert!(mini.get(1, 1).expect("cell").is_land());
    }

    #[test]
    fn test_region_copy_pads_and_crops() {
        let mut raster = TerrainRaster::new_ocean(3, 3).expect("raster");
        raster.set(2, 2, TerrainCell::encode(TerrainType::Plains, 2));
        let page = raster.read_region(2, 2, 4, TerrainCell::encode(TerrainType::Lake, 0));
        assert_eq!(page[0], 0x82);
        assert_eq!(page[1], 0x00);
        assert_eq!(page.len(), 16);

        let mut copy = TerrainRaster::new_ocean(3, 3).expect("raster");
        copy.write_region(2, 2, 4, &page);
        copy.recount_land();
        assert_eq!(copy, raster);
    }

    fn arb_raster() -> impl Strategy<Value = TerrainRaster> {
        (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            prop::collection::vec(
                prop_oneof![
                    (0u8..32).prop_map(|m| encode_raw(TerrainType::Ocean, m)),
                    (0u8..32).prop_map(|m| encode_raw(TerrainType::Lake, m)),
                    (0u8..32).prop_map(|m| encode_raw(TerrainType::Plains, m)),
                ],
                (w * h) as usize,
            )
            .prop_map(move |bytes| TerrainRaster::from_bytes(w, h, bytes).expect("sized"))
        })
    }

    fn encode_raw(terrain: TerrainType, magnitude: u8) -> u8 {
        TerrainCell::encode(terrain, magnitude).raw()
    }

    proptest! {
        #[test]
        fn prop_shore_idempotent(raster in arb_raster()) {
            let once = raster.synthesize_shores();
            prop_assert_eq!(once.synthesize_shores(), once);
        }

        #[test]
        fn prop_shore_round_trip_classification(raster in arb_raster()) {
            let restored = raster.synthesize_shores().remove_shores();
            for (before, after) in raster.cells().iter().zip(restored.cells()) {
                prop_assert_eq!(TerrainType::classify(*before).is_land(), after.is_land());
                prop_assert_eq!(before.decode().is_ocean, after.decode().is_ocean);
                prop_assert_eq!(before.decode().is_lake, after.decode().is_lake);
            }
            prop_assert_eq!(restored.land_tile_count(), raster.land_tile_count());
        }
    }
}
