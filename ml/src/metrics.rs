use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, File},
    path::Path,
};

/// Which data the metric was measured on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
}

/// One point of a metric time series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrainingMetric {
    pub step: usize,
    pub value: f32,
    pub split: Split,
}

/// Append-only loss and accuracy series of a training run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricSeries {
    loss: Vec<TrainingMetric>,
    accuracy: Vec<TrainingMetric>,
}

impl MetricSeries {
    pub(crate) fn push_loss(&mut self, step: usize, value: f32) {
        self.loss.push(TrainingMetric {
            step,
            value,
            split: Split::Train,
        });
    }

    pub(crate) fn push_accuracy(&mut self, step: usize, value: f32) {
        self.accuracy.push(TrainingMetric {
            step,
            value,
            split: Split::Train,
        });
    }

    pub fn losses(&self) -> &[TrainingMetric] {
        &self.loss
    }

    pub fn accuracies(&self) -> &[TrainingMetric] {
        &self.accuracy
    }

    pub fn last_loss(&self) -> Option<&TrainingMetric> {
        self.loss.last()
    }

    pub fn last_accuracy(&self) -> Option<&TrainingMetric> {
        self.accuracy.last()
    }

    /// Step of the most recent loss entry.
    pub fn last_step(&self) -> Option<usize> {
        self.loss.last().map(|metric| metric.step)
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty() && self.accuracy.is_empty()
    }

    /// Writes both series as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
        }
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("failed to write metrics to {}", path.display()))
    }
}
