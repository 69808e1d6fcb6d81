//! Named map library.
//!
//! Each map is a directory:
//!
//! ```text
//! <root>/<name>/manifest.json
//! <root>/<name>/map.bin        packed cells with shores
//! <root>/<name>/mini_map.bin   optional, same format
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use terra_common::{TerraError, TerraResult};
use terra_kernel::TerrainRaster;
use tracing::{debug, info, warn};

use crate::export::{export_binary, import_binary};
use crate::manifest::{MapManifest, Nation};
use crate::save::validate_name;

/// Manifest file name inside a map directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Full-size terrain file name.
pub const MAP_FILE: &str = "map.bin";

/// Mini-map terrain file name.
pub const MINI_MAP_FILE: &str = "mini_map.bin";

/// A map loaded from the library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryMap {
    /// Manifest as stored
    pub manifest: MapManifest,
    /// Terrain with shores removed
    pub raster: TerrainRaster,
    /// Mini-map, if the library has one
    pub mini_map: Option<TerrainRaster>,
}

/// Directory of named maps.
#[derive(Debug, Clone)]
pub struct MapLibrary {
    root: PathBuf,
}

impl MapLibrary {
    /// Opens a library rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Library root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether a map with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.map_dir(name).join(MANIFEST_FILE).is_file()
    }

    /// Names of all maps, sorted.
    pub fn list(&self) -> TerraResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.join(MANIFEST_FILE).is_file() {
                if let Some(name) = path.file_name() {
                    names.push(name.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads a manifest without touching the terrain.
    pub fn manifest(&self, name: &str) -> TerraResult<MapManifest> {
        validate_name(name)?;
        let path = self.map_dir(name).join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(TerraError::not_found("map", name));
        }
        let reader = BufReader::new(File::open(&path)?);
        serde_json::from_reader(reader).map_err(|e| TerraError::Serialization(e.to_string()))
    }

    /// Loads a map.
    ///
    /// Fails with `NotFound` for an unknown name and `CorruptedData` when a
    /// terrain file does not match the manifest's dimensions.
    pub fn load(&self, name: &str) -> TerraResult<LibraryMap> {
        let manifest = self.manifest(name)?;
        let dir = self.map_dir(name);

        let map_path = dir.join(MAP_FILE);
        if !map_path.is_file() {
            return Err(TerraError::not_found("map terrain", format!("{name}/{MAP_FILE}")));
        }
        let raster = import_binary(manifest.map.width, manifest.map.height, fs::read(&map_path)?)?;
        manifest.validate(&raster)?;

        let mini_path = dir.join(MINI_MAP_FILE);
        let mini_map = if mini_path.is_file() {
            let info = &manifest.mini_map;
            Some(import_binary(info.width, info.height, fs::read(&mini_path)?)?)
        } else {
            debug!("Map '{name}' has no mini-map file");
            None
        };

        let misplaced = manifest.misplaced_nations().len();
        if misplaced > 0 {
            warn!("Map '{name}' has {misplaced} nations outside the map");
        }
        info!("Loaded library map '{}' ({}x{})", name, manifest.map.width, manifest.map.height);
        Ok(LibraryMap {
            manifest,
            raster,
            mini_map,
        })
    }

    /// Writes a map into the library, replacing any map with the same name.
    pub fn install(
        &self,
        name: &str,
        raster: &TerrainRaster,
        nations: Vec<Nation>,
    ) -> TerraResult<MapManifest> {
        validate_name(name)?;
        let dir = self.map_dir(name);
        fs::create_dir_all(&dir)?;

        let (manifest, mini) = MapManifest::from_raster(name, raster, nations)?;
        {
            let mut writer = BufWriter::new(File::create(dir.join(MANIFEST_FILE))?);
            serde_json::to_writer_pretty(&mut writer, &manifest)
                .map_err(|e| TerraError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        fs::write(dir.join(MAP_FILE), export_binary(raster))?;
        fs::write(dir.join(MINI_MAP_FILE), export_binary(&mini))?;

        info!("Installed map '{name}' into {}", self.root.display());
        Ok(manifest)
    }
}
