//! Editor configuration.
//!
//! Loaded from `terra.toml`. Missing or unreadable files fall back to the
//! defaults with a warning; missing keys take their default value.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use terra_kernel::{BrushConfig, EngineConfig, GridConfig, PoolConfig, MAX_BATCH_STROKES};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "terra.toml";

/// Tile backend to run the engine on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host-memory reference backend
    #[default]
    Cpu,
    /// Headless wgpu device
    Gpu,
}

/// Editor configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    // === Engine ===
    /// Tile backend
    pub backend: BackendKind,
    /// Accept a software adapter when the GPU backend is selected
    pub force_fallback_adapter: bool,
    /// Resident tile cap
    pub max_active_chunks: usize,
    /// Render target pool size (0 = two per resident tile plus one spare pair)
    pub target_pool_size: usize,
    /// Idle render targets are destroyed after this many seconds
    pub target_idle_secs: u64,
    /// Render targets created up front
    pub prewarm_targets: usize,
    /// Offscreen renderer pool size
    pub renderer_pool_size: usize,
    /// Idle renderers are destroyed after this many seconds
    pub renderer_ttl_secs: u64,
    /// Renderers created up front
    pub prewarm_renderers: usize,
    /// Strokes per brush batch
    pub max_batch: usize,

    // === Storage ===
    /// Directory of local saves
    pub save_dir: PathBuf,
    /// Directory of the named map library
    pub maps_dir: PathBuf,
    /// Run-length compress new saves
    pub compress_saves: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        let brush = BrushConfig::default();
        Self {
            backend: BackendKind::Cpu,
            force_fallback_adapter: false,
            max_active_chunks: grid.max_active_chunks,
            target_pool_size: 0,
            target_idle_secs: grid.target_pool.max_idle_time.as_secs(),
            prewarm_targets: grid.prewarm_targets,
            renderer_pool_size: brush.renderer_pool.max_size,
            renderer_ttl_secs: brush.renderer_pool.max_idle_time.as_secs(),
            prewarm_renderers: brush.prewarm_renderers,
            max_batch: brush.max_batch,
            save_dir: PathBuf::from(terra_map::DEFAULT_SAVE_DIR),
            maps_dir: PathBuf::from("maps"),
            compress_saves: true,
        }
    }
}

impl EditorConfig {
    /// Load configuration from a specific path.
    /// Returns default config if the file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values to ranges the engine accepts.
    pub fn validate(&mut self) {
        self.max_active_chunks = self.max_active_chunks.max(1);
        self.renderer_pool_size = self.renderer_pool_size.max(1);
        self.max_batch = self.max_batch.clamp(1, MAX_BATCH_STROKES);
        self.prewarm_renderers = self.prewarm_renderers.min(self.renderer_pool_size);
    }

    /// Render target pool size after resolving the automatic setting.
    #[must_use]
    pub const fn effective_target_pool_size(&self) -> usize {
        if self.target_pool_size == 0 {
            (self.max_active_chunks + 1) * 2
        } else {
            self.target_pool_size
        }
    }

    /// Engine settings for this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            grid: GridConfig {
                max_active_chunks: self.max_active_chunks,
                target_pool: PoolConfig {
                    label: "render-target",
                    max_size: self.effective_target_pool_size(),
                    max_idle_time: Duration::from_secs(self.target_idle_secs),
                },
                prewarm_targets: self.prewarm_targets,
            },
            brush: BrushConfig {
                max_batch: self.max_batch,
                renderer_pool: PoolConfig {
                    label: "offscreen-renderer",
                    max_size: self.renderer_pool_size,
                    max_idle_time: Duration::from_secs(self.renderer_ttl_secs),
                },
                prewarm_renderers: self.prewarm_renderers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_matches_engine() {
        let config = EditorConfig::default();
        let engine = config.engine_config();
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(engine.grid.max_active_chunks, GridConfig::default().max_active_chunks);
        assert_eq!(engine.grid.target_pool.max_size, GridConfig::default().target_pool.max_size);
        assert_eq!(
            engine.brush.renderer_pool.max_size,
            BrushConfig::default().renderer_pool.max_size
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = EditorConfig {
            max_active_chunks: 0,
            renderer_pool_size: 0,
            max_batch: 10_000,
            prewarm_renderers: 5,
            ..EditorConfig::default()
        };
        config.validate();
        assert_eq!(config.max_active_chunks, 1);
        assert_eq!(config.renderer_pool_size, 1);
        assert_eq!(config.max_batch, MAX_BATCH_STROKES);
        assert_eq!(config.prewarm_renderers, 1);
        assert_eq!(config.effective_target_pool_size(), 4);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let config = EditorConfig {
            backend: BackendKind::Gpu,
            max_active_chunks: 64,
            compress_saves: false,
            ..EditorConfig::default()
        };
        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EditorConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&config_path, "backend = \"gpu\"\nmax_active_chunks = 8\n").expect("write");

        let loaded = EditorConfig::load_from(&config_path);
        assert_eq!(loaded.backend, BackendKind::Gpu);
        assert_eq!(loaded.max_active_chunks, 8);
        assert_eq!(loaded.effective_target_pool_size(), 18);
        assert_eq!(loaded.save_dir, PathBuf::from(terra_map::DEFAULT_SAVE_DIR));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&config_path, "backend = [").expect("write");
        assert_eq!(EditorConfig::load_from(&config_path), EditorConfig::default());
        assert_eq!(EditorConfig::load_from("/nonexistent/terra.toml"), EditorConfig::default());
    }
}
