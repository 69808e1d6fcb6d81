//! Map manifest and mini-map.
//!
//! The manifest is the small JSON record that travels next to a terrain
//! raster: its dimensions, land count, the down-sampled mini-map's
//! dimensions and the nations placed on it.

use serde::{Deserialize, Serialize};
use terra_common::{TerraError, TerraResult};
use terra_kernel::TerrainRaster;
use tracing::warn;

/// Nearest-neighbour scale factor between a map and its mini-map.
pub const MINI_MAP_FACTOR: u32 = 2;

/// Dimensions and land count of one raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Width in cells
    pub width: u32,
    /// Height in cells
    pub height: u32,
    /// Number of land cells
    pub num_land_tiles: u32,
}

impl MapInfo {
    /// Describes a raster.
    #[must_use]
    pub fn of(raster: &TerrainRaster) -> Self {
        Self {
            width: raster.width(),
            height: raster.height(),
            num_land_tiles: raster.land_tile_count(),
        }
    }

    /// Number of cells the described raster holds.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A nation placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nation {
    /// Spawn cell `[x, y]`
    pub coordinates: [u32; 2],
    /// Flag asset name
    #[serde(default)]
    pub flag: String,
    /// Display name
    pub name: String,
    /// Relative strength
    #[serde(default)]
    pub strength: u32,
}

impl Nation {
    /// Creates a nation with no flag and strength 1.
    pub fn new(name: impl Into<String>, x: u32, y: u32) -> Self {
        Self {
            coordinates: [x, y],
            flag: String::new(),
            name: name.into(),
            strength: 1,
        }
    }
}

/// Manifest shared by saves, exports and the map library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapManifest {
    /// Map name
    pub name: String,
    /// Full-size raster
    pub map: MapInfo,
    /// Down-sampled raster
    pub mini_map: MapInfo,
    /// Nations on the map
    #[serde(default)]
    pub nations: Vec<Nation>,
}

impl MapManifest {
    /// Builds a manifest for a raster along with its mini-map.
    pub fn from_raster(
        name: impl Into<String>,
        raster: &TerrainRaster,
        nations: Vec<Nation>,
    ) -> TerraResult<(Self, TerrainRaster)> {
        let mini = raster.downsample(MINI_MAP_FACTOR)?;
        let manifest = Self {
            name: name.into(),
            map: MapInfo::of(raster),
            mini_map: MapInfo::of(&mini),
            nations,
        };
        Ok((manifest, mini))
    }

    /// Checks that a raster matches the manifest's dimensions.
    ///
    /// A land count that disagrees only logs a warning; the raster's own
    /// count is authoritative.
    pub fn validate(&self, raster: &TerrainRaster) -> TerraResult<()> {
        if raster.width() != self.map.width || raster.height() != self.map.height {
            return Err(TerraError::CorruptedData(format!(
                "Map '{}' is {}x{} but the manifest says {}x{}",
                self.name,
                raster.width(),
                raster.height(),
                self.map.width,
                self.map.height
            )));
        }
        if raster.land_tile_count() != self.map.num_land_tiles {
            warn!(
                "Map '{}' land count {} disagrees with manifest ({})",
                self.name,
                raster.land_tile_count(),
                self.map.num_land_tiles
            );
        }
        Ok(())
    }

    /// Nations whose spawn cell lies outside the map.
    #[must_use]
    pub fn misplaced_nations(&self) -> Vec<&Nation> {
        self.nations
            .iter()
            .filter(|n| n.coordinates[0] >= self.map.width || n.coordinates[1] >= self.map.height)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_kernel::{TerrainCell, TerrainType};

    fn island() -> TerrainRaster {
        let mut raster = TerrainRaster::new_ocean(10, 6).expect("raster");
        for y in 2..4 {
            for x in 2..6 {
                raster.set(x, y, TerrainCell::encode(TerrainType::Plains, 4));
            }
        }
        raster
    }

    fn isle_manifest() -> (MapManifest, TerrainRaster) {
        MapManifest::from_raster("isle", &island(), Vec::new()).expect("manifest")
    }

    #[test]
    fn test_manifest_from_raster() {
        let raster = island();
        let nations = vec![Nation::new("Avar", 3, 3)];
        let (manifest, mini) =
            MapManifest::from_raster("isle", &raster, nations).expect("manifest");
        assert_eq!(manifest.map, MapInfo { width: 10, height: 6, num_land_tiles: 8 });
        assert_eq!(manifest.mini_map.width, 5);
        assert_eq!(manifest.mini_map.height, 3);
        assert_eq!(manifest.mini_map.num_land_tiles, mini.land_tile_count());
        assert_eq!(mini.land_tile_count(), 2);
    }

    #[test]
    fn test_manifest_json_is_snake_case() {
        let (manifest, _) = isle_manifest();
        let json = serde_json::to_value(&manifest).expect("json");
        assert_eq!(json["map"]["num_land_tiles"], 8);
        assert_eq!(json["mini_map"]["width"], 5);
        assert!(json["nations"].as_array().expect("array").is_empty());
    }

    #[test]
    fn test_nation_defaults_on_read() {
        let nation: Nation =
            serde_json::from_str(r#"{"coordinates":[4,5],"name":"Borea"}"#).expect("nation");
        assert_eq!(nation.coordinates, [4, 5]);
        assert!(nation.flag.is_empty());
        assert_eq!(nation.strength, 0);
    }

    #[test]
    fn test_validate_dimensions() {
        let raster = island();
        let (mut manifest, _) =
            MapManifest::from_raster("isle", &raster, Vec::new()).expect("manifest");
        assert!(manifest.validate(&raster).is_ok());

        manifest.map.num_land_tiles = 99;
        assert!(manifest.validate(&raster).is_ok());

        manifest.map.width = 11;
        assert!(matches!(manifest.validate(&raster), Err(TerraError::CorruptedData(_))));
    }

    #[test]
    fn test_misplaced_nations() {
        let (mut manifest, _) = isle_manifest();
        manifest.nations = vec![Nation::new("In", 9, 5), Nation::new("Out", 10, 0)];
        let misplaced = manifest.misplaced_nations();
        assert_eq!(misplaced.len(), 1);
        assert_eq!(misplaced[0].name, "Out");
    }
}
