//! # Terra Map
//!
//! Persistence boundary for Terra terrain.
//!
//! This crate handles:
//! - Map manifests and down-sampled mini-maps
//! - Versioned local saves (`LocalSave`, `SaveStore`)
//! - JSON and raw binary exports with synthesized shores
//! - The on-disk library of named maps

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod export;
pub mod library;
pub mod manifest;
pub mod save;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::export::*;
    pub use crate::library::*;
    pub use crate::manifest::*;
    pub use crate::save::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use terra_kernel::{TerrainCell, TerrainRaster, TerrainType};

    #[test]
    fn test_save_then_export_agree() {
        let mut raster = TerrainRaster::new_ocean(24, 24).expect("raster");
        raster.set(12, 12, TerrainCell::encode(TerrainType::Mountain, 30));

        let dir = tempfile::tempdir().expect("tempdir");
        let store = SaveStore::new(dir.path());
        let record = LocalSave::capture("peak", &raster, Vec::new(), true).expect("capture");
        store.save("peak", &record).expect("save");
        let (_, restored) = store.load_raster("peak").expect("load");

        let json = export_json("peak", &restored, &[]).expect("export");
        let imported = import_json(&json).expect("import");
        assert_eq!(imported.raster.land_tile_count(), 1);
        assert_eq!(imported.raster.get(12, 12), raster.get(12, 12));
    }
}
