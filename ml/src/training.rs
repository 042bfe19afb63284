use crate::{
    control::{Interrupter, LoopState, ThreadYield, YieldPoint},
    error::{FitError, TrainingError},
    inference::InferenceReport,
    learner::{FitHistory, TrainableModel},
    metrics::MetricSeries,
    report::{LogReporter, ReportingSink},
    sampler::BatchSampler,
};
use burn::{config::Config, tensor::backend::Backend};
use rand::{SeedableRng, rngs::StdRng};

/// Hyper-parameters of a training run.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Number of fit iterations.
    #[config(default = 150)]
    pub total_steps: usize,
    #[config(default = 40)]
    pub batch_size: usize,
    /// An evaluation batch is drawn on every step divisible by this.
    #[config(default = 5)]
    pub eval_every: usize,
    #[config(default = 250)]
    pub eval_batch_size: usize,
    #[config(default = 0.1)]
    pub learning_rate: f64,
    /// Examples drawn for the prediction pass after training.
    #[config(default = 100)]
    pub prediction_examples: usize,
    /// Seed for batch sampling; entropy when absent.
    pub seed: Option<u64>,
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), TrainingError> {
        if self.total_steps == 0 {
            return Err(TrainingError::InvalidConfig("total_steps must be positive"));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be positive"));
        }
        if self.eval_every == 0 {
            return Err(TrainingError::InvalidConfig("eval_every must be positive"));
        }
        if self.eval_batch_size == 0 {
            return Err(TrainingError::InvalidConfig("eval_batch_size must be positive"));
        }
        Ok(())
    }
}

/// How a run that did not fail ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(MetricSeries),
    /// Stopped through the [`Interrupter`] before `next_step` ran.
    Cancelled {
        next_step: usize,
        metrics: MetricSeries,
    },
}

impl RunOutcome {
    pub fn metrics(&self) -> &MetricSeries {
        match self {
            Self::Completed(metrics) => metrics,
            Self::Cancelled { metrics, .. } => metrics,
        }
    }
}

/// Drives fit iterations over sampled batches: `Idle -> Running -> {Completed, Failed, Cancelled}`.
///
/// The loop is the only mutator of the model and of the metric series; `run`
/// takes `&mut self` so a model never has two runs in flight.
pub struct TrainingLoop<B: Backend, M> {
    sampler: BatchSampler<B>,
    model: M,
    rng: StdRng,
    sink: Box<dyn ReportingSink>,
    yielder: Box<dyn YieldPoint>,
    interrupter: Interrupter,
    state: LoopState,
    metrics: MetricSeries,
}

impl<B: Backend, M: TrainableModel<B>> TrainingLoop<B, M> {
    pub fn new(sampler: BatchSampler<B>, model: M, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sampler,
            model,
            rng,
            sink: Box::new(LogReporter),
            yielder: Box::new(ThreadYield),
            interrupter: Interrupter::new(),
            state: LoopState::Idle,
            metrics: MetricSeries::default(),
        }
    }

    pub fn with_sink(mut self, sink: impl ReportingSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_yield_point(mut self, yielder: impl YieldPoint + 'static) -> Self {
        self.yielder = Box::new(yielder);
        self
    }

    /// Handle that cancels the run before its next step.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn metrics(&self) -> &MetricSeries {
        &self.metrics
    }

    /// Runs `config.total_steps` fit iterations.
    ///
    /// A fit failure aborts the run in the `Failed` state; the error carries
    /// the failing step and every metric recorded before it.
    pub fn run(&mut self, config: &TrainingConfig) -> Result<RunOutcome, TrainingError> {
        if self.state != LoopState::Idle {
            return Err(TrainingError::NotIdle(self.state));
        }
        config.validate()?;

        self.state = LoopState::Running;
        log::info!(
            "Executing {} training steps (batch {}, eval batch {} every {} steps)",
            config.total_steps,
            config.batch_size,
            config.eval_batch_size,
            config.eval_every
        );
        self.sink.on_training_started();

        for step in 0..config.total_steps {
            if self.interrupter.should_stop() {
                log::info!("Training interrupted before step {step}.");
                self.state = LoopState::Cancelled;
                return Ok(RunOutcome::Cancelled {
                    next_step: step,
                    metrics: self.metrics.clone(),
                });
            }

            let evaluate = step % config.eval_every == 0;
            match self.fit_step(config, evaluate) {
                Ok(history) => self.record(step, evaluate, &history),
                Err(source) => {
                    log::warn!("Fit failed at step {step}: {source}");
                    self.state = LoopState::Failed;
                    return Err(TrainingError::Fit {
                        step,
                        metrics: self.metrics.clone(),
                        source,
                    });
                }
            }

            self.sink.on_metrics_updated(&self.metrics);
            self.yielder.yield_step(step);
        }

        self.state = LoopState::Completed;
        log::info!("Training completed after {} steps.", config.total_steps);
        Ok(RunOutcome::Completed(self.metrics.clone()))
    }

    /// Samples this step's batches and runs one fit on them.
    ///
    /// Both batches are dropped when this returns, so their tensor buffers
    /// are released on the error path as well.
    fn fit_step(
        &mut self,
        config: &TrainingConfig,
        evaluate: bool,
    ) -> Result<FitHistory, FitError> {
        let batch = self.sampler.sample(&mut self.rng, config.batch_size);
        let validation =
            evaluate.then(|| self.sampler.sample(&mut self.rng, config.eval_batch_size));
        self.model.fit(&batch, validation.as_ref())
    }

    fn record(&mut self, step: usize, evaluate: bool, history: &FitHistory) {
        log::debug!("step {step}: loss {:.4}", history.train.loss);
        self.metrics.push_loss(step, history.train.loss);
        if evaluate {
            self.metrics.push_accuracy(step, history.train.accuracy);
            match history.validation {
                Some(validation) => log::info!(
                    "step {:>4} | train_loss: {:.4} | train_acc: {:>6.2}% | val_loss: {:.4} | val_acc: {:>6.2}%",
                    step,
                    history.train.loss,
                    history.train.accuracy * 100.0,
                    validation.loss,
                    validation.accuracy * 100.0
                ),
                None => log::info!(
                    "step {:>4} | train_loss: {:.4} | train_acc: {:>6.2}%",
                    step,
                    history.train.loss,
                    history.train.accuracy * 100.0
                ),
            }
        }
    }

    /// Predicts `examples` freshly sampled examples and reports them to the sink.
    pub fn show_predictions(&mut self, examples: usize) -> Result<InferenceReport, FitError> {
        if examples == 0 {
            return Ok(InferenceReport::default());
        }
        let batch = self.sampler.sample(&mut self.rng, examples);
        let report = InferenceReport::from_batch(&self.model, &batch)?;
        drop(batch);
        self.sink.on_inference_results(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        control::Headless,
        dataset::{BoozeBatch, DatasetCache, Example},
        learner::BatchScore,
        report::NullSink,
    };
    use burn::backend::NdArray;
    use std::{cell::RefCell, rc::Rc};

    type TestBackend = NdArray<f32>;

    #[derive(Default)]
    struct Calls {
        batch_sizes: Vec<usize>,
        eval_sizes: Vec<Option<usize>>,
    }

    /// Fails on `fail_at`, otherwise reports a shrinking loss.
    struct ScriptedModel {
        fail_at: Option<usize>,
        calls: Rc<RefCell<Calls>>,
    }

    impl ScriptedModel {
        fn new(fail_at: Option<usize>) -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            (
                Self {
                    fail_at,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl TrainableModel<TestBackend> for ScriptedModel {
        fn fit(
            &mut self,
            batch: &BoozeBatch<TestBackend>,
            validation: Option<&BoozeBatch<TestBackend>>,
        ) -> Result<FitHistory, FitError> {
            let mut calls = self.calls.borrow_mut();
            let step = calls.batch_sizes.len();
            calls.batch_sizes.push(batch.len());
            calls.eval_sizes.push(validation.map(|v| v.len()));
            if self.fail_at == Some(step) {
                return Err(FitError::Backend("out of memory".into()));
            }
            let score = BatchScore {
                loss: 1.0 / (step + 1) as f32,
                accuracy: 0.5,
            };
            Ok(FitHistory {
                train: score,
                validation: validation.map(|_| score),
            })
        }

        fn predict(&self, batch: &BoozeBatch<TestBackend>) -> Result<Vec<usize>, FitError> {
            Ok(vec![0; batch.len()])
        }
    }

    /// Cancels the run once `after` steps have completed.
    struct StopAfter {
        after: usize,
        interrupter: Interrupter,
    }

    impl YieldPoint for StopAfter {
        fn yield_step(&mut self, step: usize) {
            if step + 1 == self.after {
                self.interrupter.stop();
            }
        }
    }

    fn sampler() -> BatchSampler<TestBackend> {
        let examples = (0..4)
            .map(|index| Example {
                index,
                pixels: vec![0.5; 12],
                label: index % 2,
            })
            .collect();
        BatchSampler::new(
            DatasetCache::from_examples(examples, 2, 2).unwrap(),
            Default::default(),
        )
    }

    fn training_loop(model: ScriptedModel) -> TrainingLoop<TestBackend, ScriptedModel> {
        TrainingLoop::new(sampler(), model, Some(42))
            .with_sink(NullSink)
            .with_yield_point(Headless)
    }

    fn config(total_steps: usize, eval_every: usize) -> TrainingConfig {
        TrainingConfig::new()
            .with_total_steps(total_steps)
            .with_eval_every(eval_every)
            .with_batch_size(6)
            .with_eval_batch_size(9)
    }

    #[test]
    fn config_defaults_match_the_demo() {
        let config = TrainingConfig::new();
        assert_eq!(config.total_steps, 150);
        assert_eq!(config.batch_size, 40);
        assert_eq!(config.eval_every, 5);
        assert_eq!(config.eval_batch_size, 250);
        assert_eq!(config.prediction_examples, 100);
        assert!(config.seed.is_none());
    }

    #[test]
    fn evaluates_only_on_multiples_of_eval_every() {
        let (model, calls) = ScriptedModel::new(None);
        let mut training = training_loop(model);

        let outcome = training.run(&config(5, 5)).unwrap();

        let metrics = outcome.metrics();
        assert_eq!(metrics.losses().len(), 5);
        assert_eq!(metrics.accuracies().len(), 1);
        assert_eq!(metrics.accuracies()[0].step, 0);
        assert_eq!(training.state(), LoopState::Completed);

        let calls = calls.borrow();
        assert_eq!(calls.batch_sizes, vec![6; 5]);
        assert_eq!(calls.eval_sizes, vec![Some(9), None, None, None, None]);
    }

    #[test]
    fn loss_steps_are_sequential() {
        let (model, _) = ScriptedModel::new(None);
        let mut training = training_loop(model);

        let outcome = training.run(&config(12, 5)).unwrap();

        let steps: Vec<usize> = outcome.metrics().losses().iter().map(|m| m.step).collect();
        assert_eq!(steps, (0..12).collect::<Vec<_>>());
        let eval_steps: Vec<usize> = outcome
            .metrics()
            .accuracies()
            .iter()
            .map(|m| m.step)
            .collect();
        assert_eq!(eval_steps, vec![0, 5, 10]);
        assert!(matches!(outcome, RunOutcome::Completed(_)));
    }

    #[test]
    fn fit_failure_keeps_metrics_up_to_the_failing_step() {
        let (model, _) = ScriptedModel::new(Some(7));
        let mut training = training_loop(model);

        let err = training.run(&config(150, 5)).unwrap_err();

        assert_eq!(training.state(), LoopState::Failed);
        assert_eq!(err.failed_step(), Some(7));
        assert_eq!(err.last_completed_step(), Some(6));
        let metrics = err.metrics().unwrap();
        assert_eq!(metrics.losses().len(), 7);
        assert_eq!(metrics.last_step(), Some(6));
        assert_eq!(training.metrics(), metrics);
        assert!(matches!(
            err,
            TrainingError::Fit {
                source: FitError::Backend(_),
                ..
            }
        ));
    }

    #[test]
    fn failure_on_first_step_has_no_completed_step() {
        let (model, _) = ScriptedModel::new(Some(0));
        let mut training = training_loop(model);

        let err = training.run(&config(3, 1)).unwrap_err();
        assert_eq!(err.failed_step(), Some(0));
        assert_eq!(err.last_completed_step(), None);
        assert!(err.metrics().unwrap().is_empty());
    }

    #[test]
    fn interrupter_cancels_between_steps() {
        let (model, calls) = ScriptedModel::new(None);
        let training = training_loop(model);
        let interrupter = training.interrupter();
        let mut training = training.with_yield_point(StopAfter {
            after: 3,
            interrupter,
        });

        let outcome = training.run(&config(10, 5)).unwrap();

        assert_eq!(training.state(), LoopState::Cancelled);
        match outcome {
            RunOutcome::Cancelled { next_step, metrics } => {
                assert_eq!(next_step, 3);
                assert_eq!(metrics.losses().len(), 3);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(calls.borrow().batch_sizes.len(), 3);
    }

    #[test]
    fn stop_before_run_cancels_immediately() {
        let (model, calls) = ScriptedModel::new(None);
        let mut training = training_loop(model);
        training.interrupter().stop();

        let outcome = training.run(&config(10, 5)).unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled { next_step: 0, .. }));
        assert!(calls.borrow().batch_sizes.is_empty());
    }

    #[test]
    fn finished_loop_cannot_run_again() {
        let (model, _) = ScriptedModel::new(None);
        let mut training = training_loop(model);
        training.run(&config(2, 1)).unwrap();

        let err = training.run(&config(2, 1)).unwrap_err();
        assert!(matches!(err, TrainingError::NotIdle(LoopState::Completed)));
    }

    #[test]
    fn invalid_config_is_rejected_without_leaving_idle() {
        let (model, calls) = ScriptedModel::new(None);
        let mut training = training_loop(model);

        let err = training.run(&config(5, 0)).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidConfig(_)));
        assert_eq!(training.state(), LoopState::Idle);
        assert!(calls.borrow().batch_sizes.is_empty());
    }

    #[test]
    fn predictions_cover_the_requested_examples() {
        let (model, _) = ScriptedModel::new(None);
        let mut training = training_loop(model);

        let report = training.show_predictions(10).unwrap();
        assert_eq!(report.len(), 10);
        assert_eq!(report.predicted_labels(), vec![0; 10]);
        for prediction in report.predictions() {
            assert_eq!(prediction.actual, prediction.index % 2);
        }
    }
}
