use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use clap::{Parser, Subcommand};
use cli::run_manifest;
use color_eyre::eyre::{Result, eyre};
use tiling::{
    BoxRasterizer, ComponentRasterizer, LabelMask, SlideManifest, TileExtractor, TilingConfig, boxes_to_geojson,
    merge_masks, save_geojson,
};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bounding boxes of one mask as JSON
    Rasterize {
        /// Mask image, one label per pixel
        #[arg(short, long)]
        mask: PathBuf,
        /// Tiling configuration (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,
        /// Magnification of the mask
        #[arg(long)]
        mask_magnification: f64,
        /// Also save the boxes as a GeoJSON overlay
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Extract tiles for every source of a manifest
    Tile {
        /// Slide manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Tiling configuration (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory for records and overlays
        #[arg(short, long)]
        output: PathBuf,
        /// Sources processed at the same time (defaults to the number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Restrict an annotation mask to the tissue of a foreground mask
    Merge {
        #[arg(long)]
        foreground: PathBuf,
        #[arg(long)]
        annotations: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the JSON schema of the tiling configuration
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Rasterize {
            mask,
            config,
            mask_magnification,
            geojson,
        } => {
            rasterize(mask, config, *mask_magnification, geojson.as_deref())?;
        }
        Commands::Tile {
            manifest,
            config,
            output,
            jobs,
        } => {
            tile(manifest, config, output, *jobs).await?;
        }
        Commands::Merge {
            foreground,
            annotations,
            output,
        } => {
            merge(foreground, annotations, output)?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&TilingConfig::schema())?);
        }
    }

    Ok(())
}

fn rasterize(mask_path: &Path, config_path: &Path, mask_magnification: f64, geojson: Option<&Path>) -> Result<()> {
    let config = TilingConfig::from_file(config_path)?;
    config.validate()?;
    let mask = LabelMask::open(mask_path, mask_magnification)?;

    let boxes = ComponentRasterizer::from_config(&config).rasterize(&mask)?;
    info!("Found {} boxes in {:?}", boxes.len(), mask_path);
    println!("{}", serde_json::to_string_pretty(&boxes)?);

    if let Some(path) = geojson {
        save_geojson(&boxes_to_geojson(&boxes, mask_magnification)?, path)?;
        info!("Overlay saved to: {:?}", path);
    }
    Ok(())
}

async fn tile(manifest_path: &Path, config_path: &Path, output: &Path, jobs: Option<usize>) -> Result<()> {
    // Configuration problems abort before any source is touched
    let config = TilingConfig::from_file(config_path)?;
    let extractor = Arc::new(TileExtractor::builder(config).build()?);
    let manifest = Arc::new(SlideManifest::from_file(manifest_path)?);
    std::fs::create_dir_all(output)?;

    let jobs = jobs.unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));
    info!("Tiling {} sources from {:?} ({} at a time)", manifest.sources.len(), manifest_path, jobs);

    let cancel = Arc::new(AtomicBool::new(false));
    let run = run_manifest(extractor, Arc::clone(&manifest), output.to_path_buf(), jobs, Arc::clone(&cancel));

    let report = tokio::select! {
        report = run => report,
        _ = tokio::signal::ctrl_c() => {
            // dropping the run aborts queued sources; running ones stop before writing
            cancel.store(true, Ordering::SeqCst);
            warn!("Received Ctrl+C, cancelling outstanding sources");
            return Err(eyre!("interrupted"));
        }
    };

    for (source, err) in report.failures() {
        warn!("Source '{source}' failed: {err}");
    }
    info!(
        "Done: {} of {} sources succeeded, {} records",
        report.successes().count(),
        manifest.sources.len(),
        report.total_records()
    );

    if report.all_failed() {
        return Err(eyre!("every source failed"));
    }
    Ok(())
}

fn merge(foreground: &Path, annotations: &Path, output: &Path) -> Result<()> {
    let foreground = LabelMask::open(foreground, 1.0)?;
    let annotations = LabelMask::open(annotations, 1.0)?;
    let merged = merge_masks(&foreground, &annotations)?;
    merged.image().save(output)?;
    info!("Merged mask saved to: {:?}", output);
    Ok(())
}
