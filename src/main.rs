//! stamp-verify - check printed codes against their reference labels
//!
//! Runs OCR on a photo or a live frame, lets the operator pick which
//! detected text is the reference label and which is the stamped code,
//! compares them and keeps an annotated history of every check.

mod app;
mod capture;
mod config;
mod live;
mod pipeline;
mod report;
mod storage;
mod verification;
mod vision;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::CheckSession;
use crate::capture::ReplaySource;
use crate::config::AppConfig;
use crate::pipeline::{VerificationError, VerificationPipeline};
use crate::storage::{HistoryStore, ImageStore, SqliteHistoryStore, StoragePaths};
use crate::verification::Comparator;
use crate::vision::{Annotator, CommandOcr, OcrAdapter, ReplayOcr, VisionConfig, VisionPipeline};

/// stamp-verify - OCR-based verification of stamped codes
#[derive(Parser, Debug)]
#[command(name = "stamp-verify", version)]
#[command(about = "Verify stamped codes against reference labels using OCR")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use precomputed PaddleOCR JSON instead of running an OCR engine
    #[arg(long, global = true)]
    ocr_results: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the text regions found in an image
    Detect {
        image: PathBuf,

        /// Write an image with every detection outlined
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two detections of an image and record the result
    Verify {
        image: PathBuf,

        /// Index of the reference label detection
        #[arg(short, long)]
        reference: usize,

        /// Index of the stamped code detection
        #[arg(short, long)]
        sample: usize,

        /// Override the similarity threshold (0.0 - 1.0)
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the result without saving it
        #[arg(long)]
        no_commit: bool,
    },

    /// Interactive session over a directory of frames
    Live {
        dir: PathBuf,

        /// Frame rate override
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Show recent verifications
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Show every record instead of the most recent ones
        #[arg(long, conflicts_with = "limit")]
        all: bool,

        /// Show character differences for failed checks
        #[arg(long)]
        diff: bool,
    },

    /// Delete all history records and recreate the database table
    RebuildDb,

    /// Print the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let (config, config_path) = load_or_default_config(args.config.as_deref())?;

    match &args.command {
        Command::Detect { image, output } => run_detect(&args, &config, image, output.as_deref()),
        Command::Verify {
            image,
            reference,
            sample,
            threshold,
            no_commit,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.comparison.threshold = *threshold;
            }
            run_verify(&args, &config, image, *reference, *sample, *no_commit)
        }
        Command::Live { dir, fps } => {
            let session = CheckSession::new(build_pipeline(&args, &config)?);
            let source = ReplaySource::from_dir(dir, fps.unwrap_or(config.capture.fps), config.capture.loop_replay)?;
            live::run_live(&session, Box::new(source), config.capture.channel_capacity)
        }
        Command::History { limit, all, diff } => {
            let store = open_history(&config)?;
            let records = if *all { store.all()? } else { store.recent(*limit)? };
            report::print_history(&records, *diff);
            println!("{} records total", store.count()?);
            Ok(())
        }
        Command::RebuildDb => {
            let store = open_history(&config)?;
            store.rebuild()?;
            match store.db_path() {
                Some(path) => println!("History database rebuilt at {}", path.display()),
                None => println!("History database rebuilt"),
            }
            Ok(())
        }
        Command::Config { write } => {
            print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            if *write {
                config::save_config(&config, &config_path)?;
                info!("Configuration written to {:?}", config_path);
            }
            Ok(())
        }
    }
}

/// Log to stderr at INFO (DEBUG with --verbose); RUST_LOG overrides both
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr);

    match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?,
        Err(_) => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

/// Load the explicit config file, else the default one if present, else
/// defaults. Returns the path the config belongs to.
fn load_or_default_config(explicit: Option<&Path>) -> Result<(AppConfig, PathBuf)> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok((config, path.to_path_buf()));
    }

    let config_path = storage::get_config_dir()?.join("config.toml");
    if config_path.exists() {
        match config::load_config(&config_path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", config_path);
                return Ok((config, config_path));
            }
            Err(e) => warn!("Ignoring invalid configuration: {:#}", e),
        }
    }

    info!("Using default configuration");
    Ok((AppConfig::default(), config_path))
}

fn build_adapter(args: &Args, config: &AppConfig) -> Result<Box<dyn OcrAdapter>> {
    if let Some(path) = &args.ocr_results {
        return Ok(Box::new(ReplayOcr::from_file(path)?));
    }

    match CommandOcr::from_config(&config.ocr) {
        Some(adapter) => Ok(Box::new(adapter)),
        None => bail!("No OCR engine configured: set ocr.command in the config or pass --ocr-results"),
    }
}

fn open_history(config: &AppConfig) -> Result<SqliteHistoryStore> {
    let paths = StoragePaths::resolve(&config.storage)?;
    SqliteHistoryStore::open(&paths.database)
}

fn build_vision(args: &Args, config: &AppConfig) -> Result<VisionPipeline> {
    let vision = VisionPipeline::new(build_adapter(args, config)?, VisionConfig::from(&config.ocr));
    info!("OCR engine: {}", vision.engine_name());
    Ok(vision)
}

fn build_annotator(config: &AppConfig) -> Annotator {
    let annotator = Annotator::new(&config.annotation);
    if !annotator.has_font() {
        warn!("No label font found, annotations will carry label boxes without text");
    }
    annotator
}

fn build_pipeline(args: &Args, config: &AppConfig) -> Result<VerificationPipeline> {
    let paths = StoragePaths::resolve(&config.storage)?;
    let images = ImageStore::new(paths.images);
    info!("Annotated images are stored in {:?}", images.dir());

    Ok(VerificationPipeline::new(
        build_vision(args, config)?,
        Comparator::with_threshold(config.comparison.threshold),
        build_annotator(config),
        images,
        Box::new(SqliteHistoryStore::open(&paths.database)?),
    ))
}

fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
    Ok(image.to_rgb8())
}

/// OCR only; history and the image store are never opened
fn run_detect(args: &Args, config: &AppConfig, image_path: &Path, output: Option<&Path>) -> Result<()> {
    let vision = build_vision(args, config)?;
    let image = load_image(image_path)?;

    let detections = match vision.process(&image) {
        Ok(result) => result.detections,
        Err(e) => {
            let e = VerificationError::from(e);
            report::print_error(&e);
            return Err(e.into());
        }
    };
    report::print_detections(&detections);

    if let Some(output) = output {
        build_annotator(config)
            .annotate(&image, detections.iter().map(|d| (d, None)))
            .save(output)
            .with_context(|| format!("Failed to write {:?}", output))?;
        println!("Annotated image written to {}", output.display());
    }
    Ok(())
}

fn run_verify(
    args: &Args,
    config: &AppConfig,
    image_path: &Path,
    reference: usize,
    sample: usize,
    no_commit: bool,
) -> Result<()> {
    let pipeline = build_pipeline(args, config)?;
    let image = load_image(image_path)?;
    info!("Similarity threshold: {}", pipeline.comparator().threshold());

    let outcome = pipeline
        .detect(&image)
        .and_then(|detections| {
            report::print_detections(&detections);
            pipeline.run_verification(&image, &detections, reference, sample)
        })
        .and_then(|verification| {
            report::print_verification(&verification);
            if !no_commit {
                pipeline.commit(&verification)?;
                println!("Saved to {}", verification.record.image_path().display());
            }
            Ok(verification)
        });

    match outcome {
        Ok(verification) if verification.result.verdict.is_pass() => Ok(()),
        Ok(_) => bail!("Verification failed"),
        Err(e) => {
            report::print_error(&e);
            Err(e.into())
        }
    }
}
