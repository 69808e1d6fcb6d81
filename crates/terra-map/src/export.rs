//! Map export and import.
//!
//! Exports feed downstream consumers, so both formats carry the packed
//! terrain with shores synthesized. Imports strip the shores again before
//! the raster reaches the editor.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use terra_common::{SchemaVersion, TerraError, TerraResult};
use terra_kernel::TerrainRaster;
use tracing::{debug, info};

use crate::manifest::Nation;

/// Value of the `format` field in a JSON export.
pub const EXPORT_FORMAT: &str = "terra-map";

/// Export header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Map name
    pub name: String,
    /// Width in cells
    pub width: u32,
    /// Height in cells
    pub height: u32,
    /// Land cell count
    pub land_tiles: u32,
    /// ISO-8601 timestamp
    pub export_date: String,
}

/// JSON export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapExport {
    /// Always [`EXPORT_FORMAT`]
    pub format: String,
    /// Document version, `major.minor`
    pub version: String,
    /// Header
    pub metadata: ExportMetadata,
    /// Packed cells with shores, row-major
    pub terrain: Vec<u8>,
    /// Nations
    #[serde(default)]
    pub nations: Vec<Nation>,
}

/// A map read back from an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMap {
    /// Map name
    pub name: String,
    /// Terrain with shores removed
    pub raster: TerrainRaster,
    /// Nations
    pub nations: Vec<Nation>,
}

impl MapExport {
    /// Builds an export document from editor terrain.
    #[must_use]
    pub fn new(name: impl Into<String>, raster: &TerrainRaster, nations: Vec<Nation>) -> Self {
        let shored = raster.synthesize_shores();
        Self {
            format: EXPORT_FORMAT.to_string(),
            version: SchemaVersion::MAP_EXPORT.short(),
            metadata: ExportMetadata {
                name: name.into(),
                width: shored.width(),
                height: shored.height(),
                land_tiles: shored.land_tile_count(),
                export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            terrain: shored.into_bytes(),
            nations,
        }
    }

    /// Validates the document and decodes it.
    pub fn into_map(self) -> TerraResult<ImportedMap> {
        if self.format != EXPORT_FORMAT {
            return Err(TerraError::CorruptedData(format!(
                "unknown export format '{}'",
                self.format
            )));
        }
        let version = SchemaVersion::parse(&self.version)
            .ok_or_else(|| export_version_mismatch(&self.version))?;
        if !SchemaVersion::MAP_EXPORT.can_read(&version) {
            return Err(export_version_mismatch(&self.version));
        }

        let raster = import_binary(self.metadata.width, self.metadata.height, self.terrain)?;
        if raster.land_tile_count() != self.metadata.land_tiles {
            debug!(
                "Export '{}' declares {} land tiles, found {}",
                self.metadata.name,
                self.metadata.land_tiles,
                raster.land_tile_count()
            );
        }
        Ok(ImportedMap {
            name: self.metadata.name,
            raster,
            nations: self.nations,
        })
    }
}

fn export_version_mismatch(actual: &str) -> TerraError {
    TerraError::VersionMismatch {
        expected: SchemaVersion::MAP_EXPORT.short(),
        actual: actual.to_string(),
    }
}

/// Serializes a map to the JSON export format.
pub fn export_json(name: &str, raster: &TerrainRaster, nations: &[Nation]) -> TerraResult<String> {
    let export = MapExport::new(name, raster, nations.to_vec());
    let json =
        serde_json::to_string(&export).map_err(|e| TerraError::Serialization(e.to_string()))?;
    info!("Exported '{name}' as JSON ({} bytes)", json.len());
    Ok(json)
}

/// Parses a JSON export.
pub fn import_json(json: &str) -> TerraResult<ImportedMap> {
    let export: MapExport =
        serde_json::from_str(json).map_err(|e| TerraError::Serialization(e.to_string()))?;
    let map = export.into_map()?;
    info!("Imported '{}' ({}x{})", map.name, map.raster.width(), map.raster.height());
    Ok(map)
}

/// Raw binary export: the packed cells with shores, nothing else.
#[must_use]
pub fn export_binary(raster: &TerrainRaster) -> Vec<u8> {
    raster.synthesize_shores().into_bytes()
}

/// Reads a raw binary export of known dimensions.
pub fn import_binary(width: u32, height: u32, bytes: Vec<u8>) -> TerraResult<TerrainRaster> {
    Ok(TerrainRaster::from_bytes(width, height, bytes)?.remove_shores())
}
