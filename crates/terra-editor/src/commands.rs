//! Command implementations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use terra_kernel::{
    BrushRequest, BrushType, CpuBackend, EditorStats, TerrainEditor, TerrainRaster, TerrainType,
    TileBackend, CHUNK_SIZE, MAX_BRUSH_RADIUS, MIN_BRUSH_RADIUS,
};
use terra_map::{
    export_binary, export_json, import_binary, import_json, LocalSave, MapLibrary, Nation,
    SaveStore,
};
use tracing::{debug, info};

use crate::config::{BackendKind, EditorConfig};

/// One brush application, or a drag between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSpec {
    /// Start point in cells
    pub from: (f32, f32),
    /// End point for a drag; `None` for a single dab
    pub to: Option<(f32, f32)>,
    /// Brush radius
    pub radius: f32,
    /// Brush kind
    pub brush: BrushType,
    /// Terrain to paint
    pub terrain: TerrainType,
    /// Magnitude or raise/lower amount
    pub magnitude: u8,
}

impl StrokeSpec {
    /// Brush requests along the stroke, spaced at half the radius.
    #[must_use]
    pub fn requests(&self) -> Vec<BrushRequest> {
        let (x0, y0) = self.from;
        let Some((x1, y1)) = self.to else {
            return vec![self.request_at(x0, y0)];
        };
        let spacing = (self.radius.clamp(MIN_BRUSH_RADIUS, MAX_BRUSH_RADIUS) * 0.5).max(1.0);
        let length = (x1 - x0).hypot(y1 - y0);
        if !length.is_finite() {
            return vec![self.request_at(x0, y0)];
        }
        let steps = (length / spacing).ceil().max(1.0) as usize;
        (0..=steps)
            .map(|i| {
                let t = i as f32 / steps as f32;
                self.request_at(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t)
            })
            .collect()
    }

    fn request_at(&self, x: f32, y: f32) -> BrushRequest {
        BrushRequest::new(x, y, self.radius, self.brush, self.terrain, self.magnitude)
    }
}

/// Result of applying strokes to a map.
#[derive(Debug)]
pub struct EditOutcome {
    /// Edited map
    pub raster: TerrainRaster,
    /// Engine counters at the end of the session
    pub stats: EditorStats,
}

/// Runs strokes through an editor on the configured backend.
pub fn edit_raster(
    config: &EditorConfig,
    raster: &TerrainRaster,
    strokes: &[StrokeSpec],
) -> Result<EditOutcome> {
    let engine = config.engine_config();
    match config.backend {
        BackendKind::Cpu => {
            let editor = TerrainEditor::new(CpuBackend::new(CHUNK_SIZE), engine)?;
            run_session(editor, raster, strokes)
        },
        BackendKind::Gpu => {
            let editor = TerrainEditor::headless_gpu(engine, config.force_fallback_adapter)
                .context("GPU backend unavailable")?;
            run_session(editor, raster, strokes)
        },
    }
}

fn run_session<B: TileBackend>(
    mut editor: TerrainEditor<B>,
    raster: &TerrainRaster,
    strokes: &[StrokeSpec],
) -> Result<EditOutcome> {
    editor.load_raster(raster)?;
    for stroke in strokes {
        for request in stroke.requests() {
            editor.queue_stroke(&request)?;
        }
        let report = editor.update()?;
        debug!("Frame {} rendered {} tiles", report.frame, report.tiles_rendered);
    }
    let raster = editor.snapshot()?;
    let stats = editor.stats();
    editor.dispose()?;
    Ok(EditOutcome { raster, stats })
}

/// Decodes the cell at a map position through the tile engine.
pub fn pick(config: &EditorConfig, name: &str, x: i64, y: i64) -> Result<()> {
    let (_, raster) = SaveStore::new(&config.save_dir).load_raster(name)?;
    let mut editor = TerrainEditor::new(CpuBackend::new(CHUNK_SIZE), config.engine_config())?;
    editor.load_raster(&raster)?;
    let Some(cell) = editor.cell_at(x, y)? else {
        bail!("({x}, {y}) is outside the {}x{} map", raster.width(), raster.height());
    };
    let decoded = cell.decode();
    println!(
        "({x}, {y}) {} magnitude {} [land={} lake={} shore={} ocean={}] raw=0x{:02x}",
        TerrainType::classify(cell).name(),
        decoded.magnitude,
        decoded.is_land,
        decoded.is_lake,
        decoded.is_shore,
        decoded.is_ocean,
        cell.raw()
    );
    editor.dispose()?;
    Ok(())
}

/// Creates an all-ocean map and stores it as a save.
pub fn new_map(
    config: &EditorConfig,
    name: &str,
    width: u32,
    height: u32,
    overwrite: bool,
) -> Result<()> {
    let store = SaveStore::new(&config.save_dir);
    if store.exists(name) && !overwrite {
        bail!("save '{name}' already exists (use --force to replace it)");
    }
    let raster = TerrainRaster::new_ocean(width, height)?;
    let record = LocalSave::capture(name, &raster, Vec::new(), config.compress_saves)?;
    store.save(name, &record)?;
    println!("Created {width}x{height} map '{name}'");
    Ok(())
}

/// Applies strokes to a saved map and writes it back.
pub fn paint(config: &EditorConfig, name: &str, strokes: &[StrokeSpec]) -> Result<()> {
    let store = SaveStore::new(&config.save_dir);
    let (record, raster) = store
        .load_raster(name)
        .with_context(|| format!("loading save '{name}'"))?;

    let outcome = edit_raster(config, &raster, strokes)?;
    let updated = LocalSave::capture(
        record.manifest.name.clone(),
        &outcome.raster,
        record.manifest.nations.clone(),
        config.compress_saves,
    )?;
    store.save(name, &updated)?;

    let brush = outcome.stats.brush;
    info!(
        "Applied {} strokes in {} batches ({} tile passes)",
        brush.flushed_strokes, brush.batches, brush.tile_passes
    );
    println!(
        "Painted '{name}': land {} -> {}",
        raster.land_tile_count(),
        outcome.raster.land_tile_count()
    );
    Ok(())
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// JSON document with metadata
    Json,
    /// Packed cells only
    Binary,
}

impl ExportFormat {
    /// Guesses the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            Self::Json
        } else {
            Self::Binary
        }
    }
}

/// Writes a saved map to an export file.
pub fn export(
    config: &EditorConfig,
    name: &str,
    out: &Path,
    format: Option<ExportFormat>,
) -> Result<()> {
    let store = SaveStore::new(&config.save_dir);
    let (record, raster) = store.load_raster(name)?;
    let format = format.unwrap_or_else(|| ExportFormat::from_path(out));
    match format {
        ExportFormat::Json => {
            let json = export_json(&record.manifest.name, &raster, &record.manifest.nations)?;
            fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
        },
        ExportFormat::Binary => {
            fs::write(out, export_binary(&raster))
                .with_context(|| format!("writing {}", out.display()))?;
        },
    }
    println!("Exported '{name}' to {}", out.display());
    Ok(())
}

/// Reads an export file into a new save.
pub fn import(
    config: &EditorConfig,
    input: &Path,
    name: &str,
    dimensions: Option<(u32, u32)>,
    format: Option<ExportFormat>,
) -> Result<()> {
    let format = format.unwrap_or_else(|| ExportFormat::from_path(input));
    let (raster, nations) = match format {
        ExportFormat::Json => {
            let json = fs::read_to_string(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let map = import_json(&json)?;
            (map.raster, map.nations)
        },
        ExportFormat::Binary => {
            let Some((width, height)) = dimensions else {
                bail!("binary imports need --width and --height");
            };
            let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
            (import_binary(width, height, bytes)?, Vec::new())
        },
    };

    let record = LocalSave::capture(name, &raster, nations, config.compress_saves)?;
    SaveStore::new(&config.save_dir).save(name, &record)?;
    println!("Imported {} as '{name}' ({}x{})", input.display(), raster.width(), raster.height());
    Ok(())
}

/// Per-type cell counts.
#[must_use]
pub fn terrain_histogram(raster: &TerrainRaster) -> [(TerrainType, usize); 5] {
    let mut counts = TerrainType::ALL.map(|t| (t, 0usize));
    for &cell in raster.cells() {
        let terrain = TerrainType::classify(cell);
        if let Some(entry) = counts.iter_mut().find(|(t, _)| *t == terrain) {
            entry.1 += 1;
        }
    }
    counts
}

/// Prints a summary of a save.
pub fn info(config: &EditorConfig, name: &str) -> Result<()> {
    let (record, raster) = SaveStore::new(&config.save_dir).load_raster(name)?;
    let manifest = &record.manifest;
    println!(
        "{} (save '{name}', version {}, saved {})",
        manifest.name, record.version, record.save_date
    );
    println!("  size      {}x{}", manifest.map.width, manifest.map.height);
    println!(
        "  tiles     {}x{} of {CHUNK_SIZE}",
        manifest.map.width.div_ceil(CHUNK_SIZE),
        manifest.map.height.div_ceil(CHUNK_SIZE)
    );
    println!("  land      {}", manifest.map.num_land_tiles);
    println!("  mini map  {}x{}", manifest.mini_map.width, manifest.mini_map.height);
    println!("  encoding  {}", if record.compressed { "rle+base64" } else { "raw" });
    for (terrain, count) in terrain_histogram(&raster) {
        println!("  {:<9} {count}", terrain.name());
    }
    for nation in &manifest.nations {
        println!("  nation    {} at {:?}", nation.name, nation.coordinates);
    }
    Ok(())
}

/// Lists the saves in the save directory.
pub fn list_saves(config: &EditorConfig) -> Result<()> {
    for save in SaveStore::new(&config.save_dir).list()? {
        println!("{:<24} {:>6}x{:<6} {}", save.name, save.width, save.height, save.save_date);
    }
    Ok(())
}

/// Lists library maps.
pub fn list_maps(config: &EditorConfig) -> Result<()> {
    let library = MapLibrary::new(&config.maps_dir);
    for name in library.list()? {
        let manifest = library.manifest(&name)?;
        println!(
            "{name:<24} {:>6}x{:<6} {} nations",
            manifest.map.width,
            manifest.map.height,
            manifest.nations.len()
        );
    }
    Ok(())
}

/// Copies a library map into a new save.
pub fn open_map(config: &EditorConfig, map: &str, save: &str) -> Result<()> {
    let loaded = MapLibrary::new(&config.maps_dir).load(map)?;
    let record = LocalSave::capture(
        map,
        &loaded.raster,
        loaded.manifest.nations,
        config.compress_saves,
    )?;
    SaveStore::new(&config.save_dir).save(save, &record)?;
    println!("Opened map '{map}' as save '{save}'");
    Ok(())
}

/// Publishes a save into the library.
pub fn install_map(config: &EditorConfig, save: &str, map: &str) -> Result<()> {
    let (record, raster) = SaveStore::new(&config.save_dir).load_raster(save)?;
    let nations: Vec<Nation> = record.manifest.nations;
    let manifest = MapLibrary::new(&config.maps_dir).install(map, &raster, nations)?;
    println!(
        "Installed '{save}' as map '{map}' ({} land tiles)",
        manifest.map.num_land_tiles
    );
    Ok(())
}

/// Adds a nation to a saved map.
pub fn add_nation(config: &EditorConfig, save: &str, nation: Nation) -> Result<()> {
    let store = SaveStore::new(&config.save_dir);
    let (mut record, raster) = store.load_raster(save)?;
    if nation.coordinates[0] >= raster.width() || nation.coordinates[1] >= raster.height() {
        bail!("nation '{}' at {:?} is outside the map", nation.name, nation.coordinates);
    }
    record.manifest.nations.push(nation);
    let updated = LocalSave::capture(
        record.manifest.name.clone(),
        &raster,
        record.manifest.nations,
        record.compressed,
    )?;
    store.save(save, &updated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> EditorConfig {
        EditorConfig {
            save_dir: dir.path().join("saves"),
            maps_dir: dir.path().join("maps"),
            ..EditorConfig::default()
        }
    }

    fn dab(x: f32, y: f32, terrain: TerrainType) -> StrokeSpec {
        StrokeSpec {
            from: (x, y),
            to: None,
            radius: 3.0,
            brush: BrushType::Paint,
            terrain,
            magnitude: 5,
        }
    }

    #[test]
    fn test_drag_spacing() {
        let mut stroke = dab(0.0, 0.0, TerrainType::Plains);
        assert_eq!(stroke.requests().len(), 1);

        stroke.radius = 4.0;
        stroke.to = Some((20.0, 0.0));
        let requests = stroke.requests();
        assert_eq!(requests.len(), 11);
        assert!((requests[10].world_x - 20.0).abs() < 1e-4);

        stroke.to = Some((0.0, 0.0));
        assert_eq!(stroke.requests().len(), 2);
    }

    #[test]
    fn test_paint_updates_save() {
        let dir = TempDir::new().expect("tempdir");
        let config = test_config(&dir);
        new_map(&config, "demo", 150, 100, false).expect("new");
        assert!(new_map(&config, "demo", 10, 10, false).is_err());

        let mut drag = dab(10.0, 50.0, TerrainType::Highland);
        drag.to = Some((140.0, 50.0));
        drag.magnitude = 14;
        paint(&config, "demo", &[drag, dab(75.0, 20.0, TerrainType::Lake)]).expect("paint");

        let (record, raster) = SaveStore::new(&config.save_dir).load_raster("demo").expect("load");
        assert!(record.manifest.map.num_land_tiles > 0);
        assert_eq!(TerrainType::classify(raster.get(75, 50).expect("cell")), TerrainType::Highland);
        assert_eq!(TerrainType::classify(raster.get(75, 20).expect("cell")), TerrainType::Lake);
        assert_eq!(TerrainType::classify(raster.get(75, 90).expect("cell")), TerrainType::Ocean);
    }

    #[test]
    fn test_edit_session_evicts_without_losing_edits() {
        let config = EditorConfig {
            max_active_chunks: 2,
            ..EditorConfig::default()
        };
        let raster = TerrainRaster::new_ocean(320, 64).expect("raster");
        let strokes: Vec<_> = (0..5)
            .map(|i| dab(32.0 + 64.0 * i as f32, 32.0, TerrainType::Mountain))
            .collect();
        let outcome = edit_raster(&config, &raster, &strokes).expect("edit");
        assert!(outcome.stats.grid.evicted >= 3);
        for i in 0..5 {
            let cell = outcome.raster.get(32 + 64 * i, 32).expect("cell");
            assert!(cell.is_land(), "tile {i} lost its edit");
        }
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let config = test_config(&dir);
        new_map(&config, "src", 64, 64, false).expect("new");
        paint(&config, "src", &[dab(30.0, 30.0, TerrainType::Plains)]).expect("paint");
        add_nation(&config, "src", Nation::new("Vale", 30, 30)).expect("nation");
        assert!(add_nation(&config, "src", Nation::new("Far", 64, 0)).is_err());

        let json_path = dir.path().join("out.json");
        let bin_path = dir.path().join("out.bin");
        export(&config, "src", &json_path, None).expect("export json");
        export(&config, "src", &bin_path, None).expect("export bin");

        import(&config, &json_path, "from_json", None, None).expect("import json");
        import(&config, &bin_path, "from_bin", Some((64, 64)), None).expect("import bin");
        assert!(import(&config, &bin_path, "no_dims", None, None).is_err());

        let store = SaveStore::new(&config.save_dir);
        let (original, _) = store.load_raster("src").expect("src");
        let (from_json, _) = store.load_raster("from_json").expect("json");
        let (from_bin, _) = store.load_raster("from_bin").expect("bin");
        assert_eq!(from_json.manifest.map, original.manifest.map);
        assert_eq!(from_json.manifest.nations.len(), 1);
        assert_eq!(from_bin.manifest.map.num_land_tiles, original.manifest.map.num_land_tiles);
    }

    #[test]
    fn test_library_install_and_open() {
        let dir = TempDir::new().expect("tempdir");
        let config = test_config(&dir);
        new_map(&config, "draft", 96, 96, false).expect("new");
        paint(&config, "draft", &[dab(48.0, 48.0, TerrainType::Mountain)]).expect("paint");

        install_map(&config, "draft", "continent").expect("install");
        open_map(&config, "continent", "copy").expect("open");
        assert!(open_map(&config, "missing", "x").is_err());

        let store = SaveStore::new(&config.save_dir);
        let (_, draft) = store.load_raster("draft").expect("draft");
        let (_, copy) = store.load_raster("copy").expect("copy");
        assert_eq!(copy.land_tile_count(), draft.land_tile_count());
    }

    #[test]
    fn test_pick_bounds() {
        let dir = TempDir::new().expect("tempdir");
        let config = test_config(&dir);
        new_map(&config, "tiny", 32, 32, false).expect("new");
        assert!(pick(&config, "tiny", 5, 5).is_ok());
        assert!(pick(&config, "tiny", 32, 5).is_err());
        assert!(pick(&config, "missing", 0, 0).is_err());
    }

    #[test]
    fn test_histogram() {
        let mut raster = TerrainRaster::new_ocean(4, 4).expect("raster");
        raster.set(0, 0, terra_kernel::TerrainCell::encode(TerrainType::Mountain, 25));
        let histogram = terrain_histogram(&raster);
        assert_eq!(histogram[0], (TerrainType::Ocean, 15));
        assert_eq!(histogram[4], (TerrainType::Mountain, 1));
    }
}
