//! Versioned local saves and the directory that stores them.
//!
//! A save is one pretty-printed JSON file, `<name>.json`, written through a
//! temp file and an atomic rename.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use terra_common::{SchemaVersion, TerraError, TerraResult};
use terra_kernel::{compress_to_base64, decompress_from_base64, TerrainRaster};
use tracing::{debug, error, info, warn};

use crate::manifest::{MapManifest, Nation};

/// Default save directory name.
pub const DEFAULT_SAVE_DIR: &str = "saves";

/// File extension of a save.
pub const SAVE_EXTENSION: &str = "json";

/// Terrain bytes as stored in a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TerrainPayload {
    /// Base64 of the run-length stream
    Armored(String),
    /// Packed cells, one number per cell
    Raw(Vec<u8>),
}

/// One persisted editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSave {
    /// Record version, `major.minor`
    pub version: String,
    /// Map manifest
    pub manifest: MapManifest,
    /// Terrain cells
    pub terrain_data: TerrainPayload,
    /// Whether `terrain_data` is run-length compressed
    pub compressed: bool,
    /// ISO-8601 timestamp
    pub save_date: String,
}

impl LocalSave {
    /// Captures a raster into a save record.
    pub fn capture(
        name: impl Into<String>,
        raster: &TerrainRaster,
        nations: Vec<Nation>,
        compressed: bool,
    ) -> TerraResult<Self> {
        let (manifest, _) = MapManifest::from_raster(name, raster, nations)?;
        let terrain_data = if compressed {
            TerrainPayload::Armored(compress_to_base64(raster.raw_bytes()))
        } else {
            TerrainPayload::Raw(raster.raw_bytes().to_vec())
        };
        Ok(Self {
            version: SchemaVersion::LOCAL_SAVE.short(),
            manifest,
            terrain_data,
            compressed,
            save_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Record version, parsed.
    pub fn schema_version(&self) -> TerraResult<SchemaVersion> {
        SchemaVersion::parse(&self.version).ok_or_else(|| version_mismatch(&self.version))
    }

    /// Decodes the terrain, checking version, flag and length.
    ///
    /// Nothing is returned unless the whole raster decoded.
    pub fn restore(&self) -> TerraResult<TerrainRaster> {
        let version = self.schema_version()?;
        if !SchemaVersion::LOCAL_SAVE.can_read(&version) {
            return Err(version_mismatch(&self.version));
        }

        let expected = self.manifest.map.cell_count();
        let bytes = match (&self.terrain_data, self.compressed) {
            (TerrainPayload::Armored(armored), true) => decompress_from_base64(armored, expected)?,
            (TerrainPayload::Raw(raw), false) => raw.clone(),
            (TerrainPayload::Armored(_), false) => {
                return Err(TerraError::CorruptedData(
                    "save is marked uncompressed but holds an encoded string".into(),
                ))
            },
            (TerrainPayload::Raw(_), true) => {
                return Err(TerraError::CorruptedData(
                    "save is marked compressed but holds a raw cell array".into(),
                ))
            },
        };

        let map = &self.manifest.map;
        let raster = TerrainRaster::from_bytes(map.width, map.height, bytes)?;
        self.manifest.validate(&raster)?;
        Ok(raster)
    }
}

fn version_mismatch(actual: &str) -> TerraError {
    TerraError::VersionMismatch {
        expected: SchemaVersion::LOCAL_SAVE.short(),
        actual: actual.to_string(),
    }
}

/// Listing entry for one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    /// Save name (file stem)
    pub name: String,
    /// Map name from the manifest
    pub map_name: String,
    /// Map width
    pub width: u32,
    /// Map height
    pub height: u32,
    /// ISO-8601 timestamp
    pub save_date: String,
}

/// Directory of local saves.
#[derive(Debug, Clone)]
pub struct SaveStore {
    save_dir: PathBuf,
}

impl Default for SaveStore {
    fn default() -> Self {
        Self::new(DEFAULT_SAVE_DIR)
    }
}

impl SaveStore {
    /// Creates a store rooted at `save_dir`. The directory is created on first write.
    pub fn new(save_dir: impl AsRef<Path>) -> Self {
        Self {
            save_dir: save_dir.as_ref().to_path_buf(),
        }
    }

    /// Directory the saves live in.
    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Creates the save directory if needed.
    pub fn ensure_save_dir(&self) -> TerraResult<()> {
        if !self.save_dir.exists() {
            fs::create_dir_all(&self.save_dir)?;
            debug!("Created save directory: {}", self.save_dir.display());
        }
        Ok(())
    }

    fn save_path(&self, name: &str) -> PathBuf {
        self.save_dir.join(format!("{name}.{SAVE_EXTENSION}"))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.save_dir.join(format!("{name}.tmp"))
    }

    /// Whether a save exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.save_path(name).exists()
    }

    /// Writes a save, replacing any previous one with the same name.
    pub fn save(&self, name: &str, record: &LocalSave) -> TerraResult<()> {
        validate_name(name)?;
        self.ensure_save_dir()?;

        let temp_path = self.temp_path(name);
        let final_path = self.save_path(name);
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer_pretty(&mut writer, record)
                .map_err(|e| TerraError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            error!("Failed to save '{name}': {e}");
            return Err(e.into());
        }

        info!("Saved '{}' ({}x{})", name, record.manifest.map.width, record.manifest.map.height);
        Ok(())
    }

    /// Reads a save record without decoding its terrain.
    pub fn load(&self, name: &str) -> TerraResult<LocalSave> {
        validate_name(name)?;
        let path = self.save_path(name);
        if !path.exists() {
            return Err(TerraError::not_found("save", name));
        }
        let reader = BufReader::new(File::open(&path)?);
        let record: LocalSave =
            serde_json::from_reader(reader).map_err(|e| TerraError::Serialization(e.to_string()))?;
        debug!("Read save '{name}' version {}", record.version);
        Ok(record)
    }

    /// Reads a save and decodes its terrain.
    pub fn load_raster(&self, name: &str) -> TerraResult<(LocalSave, TerrainRaster)> {
        let record = self.load(name)?;
        let raster = record.restore()?;
        info!("Loaded save '{name}'");
        Ok((record, raster))
    }

    /// Deletes a save.
    pub fn delete(&self, name: &str) -> TerraResult<()> {
        validate_name(name)?;
        let path = self.save_path(name);
        if !path.exists() {
            return Err(TerraError::not_found("save", name));
        }
        fs::remove_file(&path)?;
        info!("Deleted save '{name}'");
        Ok(())
    }

    /// Lists saves, newest first. Unreadable files are skipped.
    pub fn list(&self) -> TerraResult<Vec<SaveSummary>> {
        if !self.save_dir.exists() {
            return Ok(Vec::new());
        }

        let mut saves = Vec::new();
        for entry in fs::read_dir(&self.save_dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == SAVE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let name = stem.to_string_lossy().to_string();
            match self.load(&name) {
                Ok(record) => saves.push(SaveSummary {
                    name,
                    map_name: record.manifest.name,
                    width: record.manifest.map.width,
                    height: record.manifest.map.height,
                    save_date: record.save_date,
                }),
                Err(e) => warn!("Skipping unreadable save '{name}': {e}"),
            }
        }

        saves.sort_by(|a, b| b.save_date.cmp(&a.save_date).then_with(|| a.name.cmp(&b.name)));
        Ok(saves)
    }
}

/// Rejects names that cannot be used as a file stem.
pub fn validate_name(name: &str) -> TerraResult<()> {
    if name.is_empty() {
        return Err(TerraError::InvalidName("empty name".to_string()));
    }
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    if let Some(c) = name.chars().find(|c| invalid_chars.contains(c)) {
        return Err(TerraError::InvalidName(format!("invalid character '{c}' in '{name}'")));
    }
    if name.starts_with('.') {
        return Err(TerraError::InvalidName(format!("'{name}' starts with a dot")));
    }
    Ok(())
}
