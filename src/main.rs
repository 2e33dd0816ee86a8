use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use i2g::{cache, config, matcher, HullKind, I2gDataset, LandmarkCache, LandmarkSet, OnnxLandmarkDetector};
use image::RgbImage;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "i2g")]
#[command(
    version,
    about = "Blended-face forgery generator - synthetic training data for face forgery detection"
)]
struct Cli {
    /// Config file (defaults to ./i2g.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect landmarks for every image in a directory and cache them
    BuildCache {
        /// Directory of real face images
        dir: PathBuf,
        /// ONNX landmark model (overrides the config)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Print a summary of a directory's landmark cache
    Inspect {
        /// Directory of real face images
        dir: PathBuf,
    },
    /// Write generated datapoints and a manifest to a directory
    Generate {
        /// Directory of real face images
        dir: PathBuf,
        /// Number of datapoints to write
        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// ONNX landmark model, needed only if the cache is missing
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::BuildCache { dir, model } => build_cache(&cfg, &dir, model),
        Commands::Inspect { dir } => inspect(&cfg, &dir),
        Commands::Generate {
            dir,
            count,
            out,
            seed,
            model,
        } => generate(&cfg, &dir, count, &out, seed, model),
    }
}

fn ensure_cache(cfg: &config::Config, dir: &Path, model: Option<PathBuf>) -> Result<PathBuf> {
    let path = cache::cache_path(dir);
    if path.is_file() || !dir.is_dir() {
        let mut unused = |_: &RgbImage| -> Result<Option<LandmarkSet>> { Ok(None) };
        return Ok(cache::ensure_built(dir, &mut unused)?);
    }

    let model = model
        .or_else(|| cfg.detector.model.clone())
        .context("No landmark cache yet and no landmark model given (use --model)")?;
    info!("Loading landmark model: {}", model.display());
    let mut detector = OnnxLandmarkDetector::from_file(&model, cfg.detector.input_size)
        .context("Failed to initialize landmark detector")?;
    cache::ensure_built(dir, &mut detector).context("Failed to build landmark cache")
}

fn build_cache(cfg: &config::Config, dir: &Path, model: Option<PathBuf>) -> Result<()> {
    let path = ensure_cache(cfg, dir, model)?;
    let cache = LandmarkCache::load(&path).context("Failed to load landmark cache")?;
    info!("✓ {} faces cached at {}", cache.len(), path.display());
    Ok(())
}

fn inspect(cfg: &config::Config, dir: &Path) -> Result<()> {
    let path = cache::cache_path(dir);
    let cache = LandmarkCache::load(&path)
        .with_context(|| format!("Failed to load landmark cache {}", path.display()))?;

    let point_counts: BTreeSet<usize> = cache.iter().map(|(_, lm)| lm.len()).collect();
    let sessions: HashSet<&str> = cache
        .ids()
        .iter()
        .map(|id| matcher::session_prefix(id, cfg.session_separator))
        .collect();

    info!("Cache: {}", path.display());
    info!("Faces: {}", cache.len());
    info!("Sessions: {}", sessions.len());
    info!("Landmarks per face: {:?}", point_counts);
    if point_counts.len() > 1 {
        warn!("Mixed landmark counts; forged samples will fail on mismatched pairs");
    }
    if sessions.len() < 2 {
        warn!("Fewer than two sessions; no forged samples can be made");
    }
    Ok(())
}

#[derive(Serialize)]
struct ManifestEntry {
    index: usize,
    id: String,
    donor: Option<String>,
    hull: Option<HullKind>,
    label: u8,
    image: String,
    mask: String,
}

fn generate(
    cfg: &config::Config,
    dir: &Path,
    count: usize,
    out: &Path,
    seed: Option<u64>,
    model: Option<PathBuf>,
) -> Result<()> {
    let path = ensure_cache(cfg, dir, model)?;
    let cache = LandmarkCache::load(&path).context("Failed to load landmark cache")?;

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let dataset = I2gDataset::new(cfg.clone(), dir, cache, &mut rng);
    if dataset.is_empty() {
        anyhow::bail!("No faces with landmarks in {}", dir.display());
    }
    info!("Generating {} samples from {} faces", count, dataset.len());

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let mut manifest = Vec::with_capacity(count);
    for i in 0..count {
        let index = i % dataset.len();
        let dp = match dataset.get_with_rng(index, &mut rng) {
            Ok(dp) => dp,
            Err(e) => {
                warn!("Sample {}: {}", i, e);
                continue;
            }
        };

        let image_name = format!("{:05}.png", i);
        let mask_name = format!("{:05}_mask.png", i);
        dp.image
            .save(out.join(&image_name))
            .with_context(|| format!("writing {}", image_name))?;
        i2g_vision::mask::to_gray(&dp.mask)
            .save(out.join(&mask_name))
            .with_context(|| format!("writing {}", mask_name))?;

        manifest.push(ManifestEntry {
            index,
            id: dp.provenance.id,
            donor: dp.provenance.donor,
            hull: dp.provenance.hull,
            label: dp.label.as_u8(),
            image: image_name,
            mask: mask_name,
        });
    }

    let manifest_path = out.join("manifest.json");
    let file = File::create(&manifest_path)
        .with_context(|| format!("creating {}", manifest_path.display()))?;
    serde_json::to_writer_pretty(file, &manifest)?;

    let real = manifest.iter().filter(|e| e.label == 1).count();
    info!(
        "✓ Wrote {} samples ({} real, {} forged) to {}",
        manifest.len(),
        real,
        manifest.len() - real,
        out.display()
    );
    Ok(())
}
