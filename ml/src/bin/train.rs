#![recursion_limit = "256"]

use anyhow::{Context, Result, anyhow};
use booze_ml::{
    BatchSampler, BoozeNet, ConvLearner, DatasetCache, DatasetLayout, ImageDecoder, MetricSeries,
    NUM_CLASSES, RunOutcome, TrainingConfig, TrainingError, TrainingLoop,
};
use burn::{
    backend::Autodiff,
    config::Config,
    optim::SgdConfig,
    tensor::backend::Backend,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

#[cfg(not(feature = "wgpu"))]
type InnerBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type InnerBackend = burn::backend::Wgpu<f32>;
type TrainBackend = Autodiff<InnerBackend>;

// --dataset-dir holds file1.jpg ..= file{count}.jpg and labels.json (class ids or one-hot rows).
// --config loads a TrainingConfig saved as JSON; the other training flags override it.

#[derive(Parser, Debug)]
#[command(name = "booze-train", about = "Train the beer vs wine classifier (Burn)")]
struct Args {
    /// Directory with the dataset images and labels.json
    #[arg(long, default_value = "booze_dataset")]
    dataset_dir: PathBuf,

    /// Number of images in the dataset
    #[arg(long, default_value_t = 35)]
    count: usize,

    /// Width images are resized to
    #[arg(long, default_value_t = booze_ml::IMAGE_WIDTH)]
    image_width: u32,

    /// Height images are resized to
    #[arg(long, default_value_t = booze_ml::IMAGE_HEIGHT)]
    image_height: u32,

    /// TrainingConfig JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of fit iterations
    #[arg(long)]
    steps: Option<usize>,

    /// Training batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Draw an evaluation batch every N steps
    #[arg(long)]
    eval_every: Option<usize>,

    /// Evaluation batch size
    #[arg(long)]
    eval_batch_size: Option<usize>,

    /// SGD learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Examples drawn for the prediction pass after training
    #[arg(long)]
    prediction_examples: Option<usize>,

    /// Random seed for batch sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Write the loss/accuracy series here as JSON
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

impl Args {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .map_err(|err| anyhow!("failed to load config {}: {err:?}", path.display()))?,
            None => TrainingConfig::new(),
        };
        if let Some(steps) = self.steps {
            config.total_steps = steps;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(eval_every) = self.eval_every {
            config.eval_every = eval_every;
        }
        if let Some(eval_batch_size) = self.eval_batch_size {
            config.eval_batch_size = eval_batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(prediction_examples) = self.prediction_examples {
            config.prediction_examples = prediction_examples;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let args = Args::parse();
    let config = args.training_config()?;

    let layout = DatasetLayout::new(&args.dataset_dir, args.count);
    let decoder = ImageDecoder::new(args.image_width, args.image_height);
    let dataset = DatasetCache::from_layout(&layout, &decoder)
        .with_context(|| format!("failed to build dataset from {}", layout.root.display()))?;

    let device = <TrainBackend as Backend>::Device::default();
    let (width, height) = dataset.image_size();
    let model =
        BoozeNet::<TrainBackend>::new(&device, height as usize, width as usize, NUM_CLASSES);
    let optim = SgdConfig::new().init::<TrainBackend, BoozeNet<TrainBackend>>();
    let learner = ConvLearner::new(model, optim, config.learning_rate);

    let sampler = BatchSampler::<TrainBackend>::new(dataset, device);
    let mut training = TrainingLoop::new(sampler, learner, config.seed);

    let metrics = match training.run(&config) {
        Ok(RunOutcome::Completed(metrics)) => metrics,
        Ok(RunOutcome::Cancelled { next_step, metrics }) => {
            log::warn!("Training cancelled before step {next_step}");
            metrics
        }
        Err(err) => return Err(report_failure(err, args.metrics_out.as_deref())),
    };

    export_metrics(&metrics, args.metrics_out.as_deref())?;

    training
        .show_predictions(config.prediction_examples)
        .context("prediction pass failed")?;

    Ok(())
}

fn export_metrics(metrics: &MetricSeries, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        metrics.write_json(path)?;
        log::info!("Metrics written to {}", path.display());
    }
    Ok(())
}

/// Saves what the failed run recorded and wraps the error with its progress.
///
/// An export failure is only logged; the training error is always returned.
fn report_failure(err: TrainingError, metrics_out: Option<&Path>) -> anyhow::Error {
    if let Some(metrics) = err.metrics() {
        if let Err(export) = export_metrics(metrics, metrics_out) {
            log::warn!("Could not export metrics of the failed run: {export:#}");
        }
    }
    let progress = match err.last_completed_step() {
        Some(step) => format!("last completed step {step}"),
        None => "no step completed".to_string(),
    };
    anyhow::Error::new(err).context(format!("training failed ({progress})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use booze_ml::FitError;

    fn fit_failure(step: usize) -> TrainingError {
        TrainingError::Fit {
            step,
            metrics: MetricSeries::default(),
            source: FitError::Backend("out of memory".into()),
        }
    }

    #[test]
    fn failed_export_does_not_hide_the_training_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let metrics_out = blocker.join("metrics.json");

        let err = report_failure(fit_failure(7), Some(&metrics_out));

        assert!(err.to_string().contains("last completed step 6"));
        let training = err.downcast_ref::<TrainingError>().unwrap();
        assert_eq!(training.failed_step(), Some(7));
        assert!(!metrics_out.exists());
    }

    #[test]
    fn failed_run_still_writes_its_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let metrics_out = dir.path().join("out").join("metrics.json");

        let err = report_failure(fit_failure(0), Some(&metrics_out));

        assert!(err.to_string().contains("no step completed"));
        assert!(metrics_out.is_file());
    }

    #[test]
    fn prediction_examples_flag_overrides_config() {
        let args = Args::parse_from(["booze-train", "--prediction-examples", "12", "--steps", "3"]);
        let config = args.training_config().unwrap();

        assert_eq!(config.prediction_examples, 12);
        assert_eq!(config.total_steps, 3);
        assert_eq!(config.batch_size, 40);
    }
}
