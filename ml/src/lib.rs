#![recursion_limit = "256"]

pub mod control;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod inference;
pub mod labels;
pub mod learner;
pub mod metrics;
pub mod model;
pub mod report;
pub mod sampler;
pub mod training;

pub use control::{Headless, Interrupter, LoopState, ThreadYield, YieldPoint};
pub use dataset::{
    BoozeBatch, BoozeBatcher, CLASS_NAMES, DatasetCache, DatasetLayout, Example, NUM_CLASSES,
};
pub use decoder::{CHANNELS, IMAGE_HEIGHT, IMAGE_WIDTH, ImageDecoder};
pub use error::{DatasetBuildError, DecodeError, FitError, LabelLoadError, TrainingError};
pub use inference::{InferenceReport, Prediction};
pub use labels::LabelStore;
pub use learner::{BatchScore, ConvLearner, FitHistory, TrainableModel};
pub use metrics::{MetricSeries, Split, TrainingMetric};
pub use model::BoozeNet;
pub use report::{LogReporter, NullSink, ReportingSink};
pub use sampler::BatchSampler;
pub use training::{RunOutcome, TrainingConfig, TrainingLoop};
