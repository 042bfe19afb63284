use crate::{control::LoopState, metrics::MetricSeries};
use std::path::PathBuf;
use thiserror::Error;

/// A single image resource could not be turned into a normalized pixel array.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to load image {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode in-memory image")]
    Format(#[from] image::ImageError),
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("resize produced {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// The label resource is missing or is not a sequence of class ids.
#[derive(Debug, Error)]
pub enum LabelLoadError {
    #[error("failed to read label file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("label resource is not a JSON array of labels")]
    Malformed(#[from] serde_json::Error),
    #[error("label #{index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

/// Building the in-memory dataset failed; nothing partial is ever returned.
#[derive(Debug, Error)]
pub enum DatasetBuildError {
    #[error("failed to decode image #{index}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },
    #[error("failed to load labels")]
    Labels(#[from] LabelLoadError),
    #[error("{images} images but {labels} labels")]
    LengthMismatch { images: usize, labels: usize },
    #[error("example #{index} has {actual} pixel values, expected {expected}")]
    PixelLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("example #{index} has label {label}, expected < {num_classes}")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        num_classes: usize,
    },
    #[error("dataset is empty")]
    Empty,
}

/// One fit (or predict) iteration of the learning model failed.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("loss diverged to {loss}")]
    Diverged { loss: f32 },
    #[error("failed to read tensor data: {0}")]
    TensorRead(String),
    #[error("model backend failure: {0}")]
    Backend(String),
}

/// Why a training run did not complete.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("fit failed at step {step}")]
    Fit {
        step: usize,
        metrics: MetricSeries,
        #[source]
        source: FitError,
    },
    #[error("training loop is {0:?}, only an idle loop can run")]
    NotIdle(LoopState),
    #[error("invalid training config: {0}")]
    InvalidConfig(&'static str),
}

impl TrainingError {
    /// Metrics collected before the run stopped, if it got that far.
    pub fn metrics(&self) -> Option<&MetricSeries> {
        match self {
            Self::Fit { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    /// Index of the failing step.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Self::Fit { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Last step whose fit call succeeded.
    pub fn last_completed_step(&self) -> Option<usize> {
        self.failed_step().and_then(|step| step.checked_sub(1))
    }
}
