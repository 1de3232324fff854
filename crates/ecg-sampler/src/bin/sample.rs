//! `sample` binary: draw training samples from an on-disk segment store.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sample -- --ds-path datasets/icentia11k --task beat --num-samples 5000
//! cargo run --bin sample -- --config run.json --export-val
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

use ecg_sampler::config::{DatasetConfig, SamplesPerPatient};
use ecg_sampler::dataset::IcentiaDataset;
use ecg_sampler::defines::HeartTask;
use ecg_sampler::error::SamplerResult;
use ecg_sampler::export::{label_histogram, materialize_validation_set};

/// Command-line arguments for the sampling binary.
#[derive(Parser, Debug)]
#[command(name = "sample", version, about = "ECG training-sample generator", long_about = None)]
struct Args {
    /// Path to a JSON configuration file. Defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the segment store root.
    #[arg(long, value_name = "DIR")]
    ds_path: Option<PathBuf>,

    /// Override the task (arrhythmia, beat, hrv).
    #[arg(long)]
    task: Option<HeartTask>,

    /// Override training samples per patient.
    #[arg(long)]
    samples_per_patient: Option<usize>,

    /// Override the master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of training samples to draw.
    #[arg(long, default_value_t = 1000)]
    num_samples: usize,

    /// Materialise the validation set (into `val_file` when configured).
    #[arg(long, default_value_t = false)]
    export_val: bool,

    /// Write the effective configuration to this path.
    #[arg(long, value_name = "FILE")]
    save_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .init();

    info!("ECG sampler v{}", ecg_sampler::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> SamplerResult<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            DatasetConfig::from_json(path)?
        }
        None => DatasetConfig::default(),
    };

    if let Some(dir) = args.ds_path {
        config.ds_path = dir;
    }
    if let Some(task) = args.task {
        config.task = task;
    }
    if let Some(n) = args.samples_per_patient {
        config.samples_per_patient = SamplesPerPatient::Total(n);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    info!("  store      : {}", config.ds_path.display());
    info!("  task       : {}", config.task);
    info!("  frame size : {} @ {} Hz", config.frame_size, config.sampling_rate);
    info!("  seed       : {}", config.seed);

    if let Some(path) = args.save_config.as_deref() {
        config.to_json(path)?;
        info!("Wrote configuration to {}", path.display());
    }

    let dataset = IcentiaDataset::open(config)?;
    let split = dataset.train_val_split()?;

    let started = Instant::now();
    let mut labels = Vec::with_capacity(args.num_samples);
    for sample in dataset.train_samples(split.train).take(args.num_samples) {
        labels.push(sample?.label);
    }
    info!(
        samples = labels.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Drew training samples"
    );
    for (label, count) in label_histogram(labels) {
        info!("  label {label}: {count}");
    }

    if args.export_val {
        let set = materialize_validation_set(&dataset, split.test)?;
        info!(samples = set.len(), shape = ?set.x.shape(), "Validation set ready");
        for (label, count) in set.label_histogram() {
            info!("  label {label}: {count}");
        }
    }
    Ok(())
}
