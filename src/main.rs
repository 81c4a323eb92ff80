use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, trace, warn};
use spill_common::{ModelConfig, StepSnapshot};
use spill_engine::{Model, StepOutcome};
use spill_visualizer::MapCanvas;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Runs a spill trajectory model described by a TOML file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Write per-step images here, overriding `output.images_dir`
    #[arg(long)]
    images: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting Spill Engine...");
    let config = ModelConfig::load(&args.config)?;
    info!("Loaded configuration from {}", args.config.display());
    debug!("Configuration: {:#?}", config);

    let mut model = Model::from_config(&config)?;
    if config.output.save_snapshots && !model.cache_enabled() {
        info!("Enabling the element cache to collect snapshots.");
        model.set_cache_enabled(true);
    }

    let images_dir = args.images.clone().or_else(|| config.output.images_dir.clone());
    if let Some(dir) = &images_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create image directory {}", dir.display()))?;
        model.set_output_map(Box::new(MapCanvas::from_config(&config)));
        info!("Writing images to {}", dir.display());
    }

    info!("Using {} Rayon threads.", rayon::current_num_threads());
    info!(
        "Running {} steps of {} s from {}...",
        model.num_time_steps(),
        model.time_step(),
        model.start_time()
    );

    let start_time = Instant::now();
    let mut previous_print_time = start_time;
    model.rewind();
    loop {
        let step_start_time = Instant::now();
        let step = match &images_dir {
            Some(dir) => model.next_image(dir)?.map(|image| image.step),
            None => match model.step()? {
                StepOutcome::Advanced(step) => Some(step),
                StepOutcome::Finished => None,
            },
        };
        let Some(step) = step else { break };
        let step_duration = step_start_time.elapsed();

        let now = Instant::now();
        let is_last_step = step as i64 + 1 >= model.num_time_steps();
        if now.duration_since(previous_print_time).as_secs_f64() >= 5.0 || is_last_step {
            let elements: usize = model.spills().items().map(|sc| sc.num_elements()).sum();
            info!(
                "Step [{}/{}] {} | Elements: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                model.num_time_steps(),
                model.model_time(),
                elements,
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = now;
        } else {
            trace!("Step [{}/{}] completed in {:.2} ms", step + 1, model.num_time_steps(), step_duration.as_secs_f64() * 1000.0);
        }
    }
    info!("Run finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());

    let base = &config.output.base_filename;
    if config.output.save_snapshots {
        let snapshots: Vec<StepSnapshot> = model.cache().iter().cloned().collect();
        let format = config.output.format.as_deref().unwrap_or("json");
        save_snapshots(base, format, &snapshots)?;
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    if config.output.save_positions {
        let filename = format!("{}_final_positions.csv", base);
        save_final_positions(Path::new(&filename), &model)?;
        info!("Final positions saved to {}", filename);
    }

    info!("Run Complete.");
    Ok(())
}

fn save_snapshots(base: &str, format: &str, snapshots: &[StepSnapshot]) -> Result<()> {
    match format {
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base);
            spill_visualizer::io::write_snapshots(&filename, snapshots)?;
            info!("{} snapshots saved to {} (binary format)", snapshots.len(), filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let mut writer = BufWriter::new(File::create(&filename).with_context(|| format!("Error creating snapshot file '{}'", filename))?);
            rmp_serde::encode::write(&mut writer, snapshots).context("Error serializing snapshots to MessagePack")?;
            writer.flush()?;
            info!("{} snapshots saved to {} (MessagePack format)", snapshots.len(), filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            let writer = BufWriter::new(File::create(&filename).with_context(|| format!("Error creating snapshot file '{}'", filename))?);
            serde_json::to_writer(writer, snapshots).context("Error serializing snapshots to JSON")?;
            info!("{} snapshots saved to {}", snapshots.len(), filename);
        }
    }
    Ok(())
}

fn save_final_positions(path: &Path, model: &Model) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Error creating CSV file '{}'", path.display()))?;
    writer.write_record(["population", "element_id", "spill_num", "lon", "lat", "depth", "status"])?;
    for sc in model.spills().items() {
        let population = if sc.uncertain() { "uncertain" } else { "certain" };
        if sc.is_empty() {
            warn!("The {} population has no elements.", population);
        }
        for i in 0..sc.num_elements() {
            let p = sc.positions[i];
            writer.write_record(&[
                population.to_string(),
                sc.element_id[i].to_string(),
                sc.spill_num[i].to_string(),
                format!("{:.6}", p.x),
                format!("{:.6}", p.y),
                format!("{:.3}", p.z),
                sc.status_codes[i].code().to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
