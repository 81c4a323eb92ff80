use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use rayon::prelude::*;
use spill_common::{ModelConfig, StepRenderer, StepSnapshot};
use spill_visualizer::io::SnapshotReader;
use spill_visualizer::MapCanvas;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin)
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the frames are written to
    #[arg(short, long, default_value = "frames")]
    output: PathBuf,

    /// Run configuration, for the map bounds and land polygons
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame width in pixels (defaults to the config's image size)
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels (defaults to the config's image size)
    #[arg(long)]
    height: Option<u32>,

    /// Snapshots rendered per parallel batch
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    info!("Starting Spill Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output.display());

    let mut reader = SnapshotReader::open(&args.input)?;
    let snapshot_count = reader.count();
    info!("Found {} snapshots in the file", snapshot_count);
    if snapshot_count == 0 {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }

    let mut snapshots: Vec<StepSnapshot> = Vec::with_capacity(snapshot_count as usize);
    for snapshot in reader.by_ref() {
        match snapshot {
            Ok(s) => snapshots.push(s),
            Err(e) => {
                error!("{:#}", e);
                warn!("Rendering the {} snapshots read before the error.", snapshots.len());
                break;
            }
        }
    }

    let mut canvas = match &args.config {
        Some(path) => {
            let mut config = ModelConfig::load(path)?;
            info!("Loaded map from {}", path.display());
            if let Some(w) = args.width {
                config.output.image_size[0] = w;
            }
            if let Some(h) = args.height {
                config.output.image_size[1] = h;
            }
            MapCanvas::from_config(&config)
        }
        None => {
            let bounds = element_extent(&snapshots);
            info!("No config given; fitting the map to element extent {:?}", bounds);
            MapCanvas::new((args.width.unwrap_or(800), args.height.unwrap_or(600)), bounds, Vec::new())
        }
    };
    canvas.draw_background()?;
    info!("Frame dimensions: {}x{} px", canvas.width(), canvas.height());

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;
    canvas.save_background(&args.output.join("background_map.png"))?;

    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let failures: Vec<String> = snapshots
        .par_iter()
        .with_min_len(args.chunk_size.max(1))
        .progress_with(progress_bar.clone())
        .filter_map(|snapshot| {
            let path = args.output.join(format!("frame_{:05}.png", snapshot.step));
            canvas
                .compose(snapshot)
                .save(&path)
                .err()
                .map(|e| format!("{}: {}", path.display(), e))
        })
        .collect();
    progress_bar.finish_with_message("Frames written");

    for failure in &failures {
        error!("Failed to write frame {}", failure);
    }
    let written = snapshots.len() - failures.len();
    let duration = start_time.elapsed();
    info!(
        "Rendered {} frames in {:.2?} ({:.1} frames per second)",
        written,
        duration,
        written as f64 / duration.as_secs_f64().max(f64::EPSILON)
    );
    if !failures.is_empty() {
        anyhow::bail!("{} frames could not be written", failures.len());
    }
    Ok(())
}

/// Bounding box of every element in the run, padded by 10%.
fn element_extent(snapshots: &[StepSnapshot]) -> ((f64, f64), (f64, f64)) {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in snapshots.iter().flat_map(|s| &s.populations).flat_map(|pop| &pop.positions) {
        min = (min.0.min(p.x), min.1.min(p.y));
        max = (max.0.max(p.x), max.1.max(p.y));
    }
    if !min.0.is_finite() {
        return ((-180.0, -90.0), (180.0, 90.0));
    }
    let pad_x = ((max.0 - min.0) * 0.1).max(0.01);
    let pad_y = ((max.1 - min.1) * 0.1).max(0.01);
    ((min.0 - pad_x, min.1 - pad_y), (max.0 + pad_x, max.1 + pad_y))
}
