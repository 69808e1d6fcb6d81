//! # Terra Editor
//!
//! Headless front end for the Terra terrain editor.
//!
//! Maps live as local saves; every command loads a save, runs it through the
//! tile engine or the persistence layer, and writes the result back.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use terra_kernel::{BrushType, TerrainType};
use terra_map::Nation;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::{ExportFormat, StrokeSpec};
use crate::config::{BackendKind, EditorConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(author, version, about = "Chunked terrain map editor")]
struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured tile backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Log at debug level
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an all-ocean map
    New {
        /// Save name
        name: String,
        /// Width in cells
        #[arg(long, default_value_t = 512)]
        width: u32,
        /// Height in cells
        #[arg(long, default_value_t = 512)]
        height: u32,
        /// Replace an existing save
        #[arg(long)]
        force: bool,
    },
    /// Apply a brush stroke to a saved map
    Paint {
        /// Save name
        name: String,
        /// Stroke start X
        #[arg(long, allow_negative_numbers = true)]
        x: f32,
        /// Stroke start Y
        #[arg(long, allow_negative_numbers = true)]
        y: f32,
        /// Drag to this X
        #[arg(long, requires = "to_y", allow_negative_numbers = true)]
        to_x: Option<f32>,
        /// Drag to this Y
        #[arg(long, requires = "to_x", allow_negative_numbers = true)]
        to_y: Option<f32>,
        /// Brush radius, 1 to 20
        #[arg(long, short = 'r', default_value_t = 5.0)]
        radius: f32,
        /// paint, erase, smooth, raise or lower
        #[arg(long, short = 'b', default_value = "paint")]
        brush: BrushType,
        /// ocean, lake, plains, highland or mountain
        #[arg(long, short = 't', default_value = "plains")]
        terrain: TerrainType,
        /// Magnitude or raise/lower amount, 1 to 31
        #[arg(long, short = 'm', default_value_t = 5)]
        magnitude: u8,
    },
    /// Export a saved map
    Export {
        /// Save name
        name: String,
        /// Output file
        out: PathBuf,
        /// Output format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
    },
    /// Import an exported map as a new save
    Import {
        /// Input file
        input: PathBuf,
        /// Save name
        #[arg(long)]
        name: String,
        /// Input format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
        /// Width of a binary import
        #[arg(long, requires = "height")]
        width: Option<u32>,
        /// Height of a binary import
        #[arg(long, requires = "width")]
        height: Option<u32>,
    },
    /// Show a saved map's manifest and terrain statistics
    Info {
        /// Save name
        name: String,
    },
    /// Decode the cell at a map position
    Pick {
        /// Save name
        name: String,
        /// Cell X
        #[arg(long, allow_negative_numbers = true)]
        x: i64,
        /// Cell Y
        #[arg(long, allow_negative_numbers = true)]
        y: i64,
    },
    /// List local saves
    Saves,
    /// Place a nation on a saved map
    Nation {
        /// Save name
        save: String,
        /// Nation name
        name: String,
        /// Spawn X
        #[arg(long)]
        x: u32,
        /// Spawn Y
        #[arg(long)]
        y: u32,
        /// Flag asset
        #[arg(long, default_value = "")]
        flag: String,
        /// Relative strength
        #[arg(long, default_value_t = 1)]
        strength: u32,
    },
    /// Work with the named map library
    #[command(subcommand)]
    Maps(MapsCommand),
    /// Write the effective configuration to the config file
    WriteConfig,
}

#[derive(Subcommand)]
enum MapsCommand {
    /// List library maps
    List,
    /// Copy a library map into a new save
    Open {
        /// Library map name
        map: String,
        /// Save name
        #[arg(long)]
        save: String,
    },
    /// Publish a save into the library
    Install {
        /// Save name
        save: String,
        /// Library map name
        #[arg(long)]
        map: String,
    },
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "terra=debug" } else { "terra=info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    info!("Terra editor {}", env!("CARGO_PKG_VERSION"));

    let mut config = EditorConfig::load_from(&cli.config);
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Command::New {
            name,
            width,
            height,
            force,
        } => commands::new_map(&config, &name, width, height, force),
        Command::Paint {
            name,
            x,
            y,
            to_x,
            to_y,
            radius,
            brush,
            terrain,
            magnitude,
        } => {
            let stroke = StrokeSpec {
                from: (x, y),
                to: to_x.zip(to_y),
                radius,
                brush,
                terrain,
                magnitude,
            };
            commands::paint(&config, &name, &[stroke])
        },
        Command::Export { name, out, format } => commands::export(&config, &name, &out, format),
        Command::Import {
            input,
            name,
            format,
            width,
            height,
        } => commands::import(&config, &input, &name, width.zip(height), format),
        Command::Info { name } => commands::info(&config, &name),
        Command::Pick { name, x, y } => commands::pick(&config, &name, x, y),
        Command::Saves => commands::list_saves(&config),
        Command::Nation {
            save,
            name,
            x,
            y,
            flag,
            strength,
        } => {
            let nation = Nation {
                coordinates: [x, y],
                flag,
                name,
                strength,
            };
            commands::add_nation(&config, &save, nation)
        },
        Command::Maps(MapsCommand::List) => commands::list_maps(&config),
        Command::Maps(MapsCommand::Open { map, save }) => commands::open_map(&config, &map, &save),
        Command::Maps(MapsCommand::Install { save, map }) => {
            commands::install_map(&config, &save, &map)
        },
        Command::WriteConfig => {
            config.save_to(&cli.config)?;
            println!("Wrote {}", cli.config.display());
            Ok(())
        },
    }
}
