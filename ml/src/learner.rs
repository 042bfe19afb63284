use crate::{dataset::BoozeBatch, error::FitError, model::BoozeNet};
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{
        ElementConversion, Tensor,
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
    },
};

/// Loss/accuracy pair measured on one batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchScore {
    pub loss: f32,
    pub accuracy: f32,
}

/// Result of one fit iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitHistory {
    /// Score on the training batch.
    pub train: BatchScore,
    /// Score on the validation batch, when one was passed.
    pub validation: Option<BatchScore>,
}

/// The learning model as seen by the training loop.
pub trait TrainableModel<B: Backend> {
    /// Runs one parameter update on `batch`. `validation` is only measured.
    fn fit(
        &mut self,
        batch: &BoozeBatch<B>,
        validation: Option<&BoozeBatch<B>>,
    ) -> Result<FitHistory, FitError>;

    /// Predicted class id for every slot of `batch`.
    fn predict(&self, batch: &BoozeBatch<B>) -> Result<Vec<usize>, FitError>;
}

/// Trains a [`BoozeNet`] with any burn optimizer on categorical cross-entropy.
pub struct ConvLearner<B: AutodiffBackend, O> {
    model: BoozeNet<B>,
    optim: O,
    learning_rate: f64,
}

impl<B, O> ConvLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BoozeNet<B>, B>,
{
    pub fn new(model: BoozeNet<B>, optim: O, learning_rate: f64) -> Self {
        Self {
            model,
            optim,
            learning_rate,
        }
    }
}

impl<B, O> TrainableModel<B> for ConvLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BoozeNet<B>, B>,
{
    fn fit(
        &mut self,
        batch: &BoozeBatch<B>,
        validation: Option<&BoozeBatch<B>>,
    ) -> Result<FitHistory, FitError> {
        let logits = self.model.forward(batch.images.clone());
        let loss = categorical_cross_entropy(logits.clone(), batch.labels.clone());
        let loss_value = loss.clone().into_scalar().elem::<f32>();
        if !loss_value.is_finite() {
            return Err(FitError::Diverged { loss: loss_value });
        }
        let accuracy = accuracy(&predicted_classes(logits)?, &batch.targets);

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optim
            .step(self.learning_rate, self.model.clone(), grads);

        let validation = match validation {
            Some(batch) => Some(self.score(batch)?),
            None => None,
        };

        Ok(FitHistory {
            train: BatchScore {
                loss: loss_value,
                accuracy,
            },
            validation,
        })
    }

    fn predict(&self, batch: &BoozeBatch<B>) -> Result<Vec<usize>, FitError> {
        let logits = self.model.valid().forward(batch.images.clone().inner());
        predicted_classes(logits)
    }
}

impl<B, O> ConvLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BoozeNet<B>, B>,
{
    /// Measures the current model on `batch` without tracking gradients.
    fn score(&self, batch: &BoozeBatch<B>) -> Result<BatchScore, FitError> {
        let logits = self.model.valid().forward(batch.images.clone().inner());
        let loss = categorical_cross_entropy(logits.clone(), batch.labels.clone().inner())
            .into_scalar()
            .elem::<f32>();
        let accuracy = accuracy(&predicted_classes(logits)?, &batch.targets);
        Ok(BatchScore { loss, accuracy })
    }
}

/// Mean of `-sum(one_hot * log_softmax(logits))` over the batch.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (log_softmax(logits, 1) * one_hot).sum_dim(1).mean().neg()
}

/// Row-wise argmax of `[batch, classes]` logits.
pub fn predicted_classes<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<usize>, FitError> {
    let data = logits.argmax(1).into_data();
    let classes = data
        .iter::<i64>()
        .map(|class| {
            usize::try_from(class)
                .map_err(|_| FitError::TensorRead(format!("negative class index {class}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(classes)
}

/// Fraction of slots where `predicted` equals `targets`.
pub fn accuracy(predicted: &[usize], targets: &[usize]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(targets)
        .filter(|(pred, target)| pred == target)
        .count();
    correct as f32 / targets.len() as f32
}
