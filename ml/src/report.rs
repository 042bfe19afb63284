use crate::{dataset::class_name, inference::InferenceReport, metrics::MetricSeries};

/// Consumer of training progress and prediction results.
///
/// Every callback has a no-op default so sinks only implement what they show.
pub trait ReportingSink {
    fn on_training_started(&mut self) {}

    fn on_metrics_updated(&mut self, _series: &MetricSeries) {}

    fn on_inference_results(&mut self, _report: &InferenceReport) {}
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ReportingSink for NullSink {}

/// Reports through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ReportingSink for LogReporter {
    fn on_training_started(&mut self) {
        log::info!("Training...");
    }

    fn on_metrics_updated(&mut self, series: &MetricSeries) {
        if let Some(loss) = series.last_loss() {
            log::debug!("step {:>4} | last loss: {:.2}", loss.step, loss.value);
        }
        if let Some(accuracy) = series
            .last_accuracy()
            .filter(|metric| Some(metric.step) == series.last_step())
        {
            log::info!(
                "step {:>4} | last accuracy: {:.2}",
                accuracy.step,
                accuracy.value
            );
        }
    }

    fn on_inference_results(&mut self, report: &InferenceReport) {
        log::info!("Testing...");
        for prediction in report.predictions() {
            log::debug!(
                "example #{:<3} pred: {:<4} true: {:<4} {}",
                prediction.index,
                class_name(prediction.predicted),
                class_name(prediction.actual),
                if prediction.is_correct() { "ok" } else { "miss" }
            );
        }
        log::info!(
            "{}/{} predictions correct ({:.1}%)",
            report.correct(),
            report.len(),
            report.accuracy() * 100.0
        );
    }
}
