use crate::{
    dataset::BoozeBatch,
    error::FitError,
    learner::{accuracy, TrainableModel},
};
use burn::tensor::backend::Backend;

/// Prediction for one sampled slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prediction {
    /// Dataset index of the example.
    pub index: usize,
    pub predicted: usize,
    pub actual: usize,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.predicted == self.actual
    }
}

/// Predictions of a model over one sampled batch, in slot order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceReport {
    predictions: Vec<Prediction>,
}

impl InferenceReport {
    /// Pairs model output with the batch's true labels.
    pub fn new(indices: &[usize], predicted: &[usize], actual: &[usize]) -> Self {
        let predictions = indices
            .iter()
            .zip(predicted)
            .zip(actual)
            .map(|((&index, &predicted), &actual)| Prediction {
                index,
                predicted,
                actual,
            })
            .collect();
        Self { predictions }
    }

    /// Runs `model` over `batch` and compares with the batch labels.
    pub fn from_batch<B: Backend, M: TrainableModel<B>>(
        model: &M,
        batch: &BoozeBatch<B>,
    ) -> Result<Self, FitError> {
        let predicted = model.predict(batch)?;
        if predicted.len() != batch.len() {
            return Err(FitError::Backend(format!(
                "model returned {} predictions for {} examples",
                predicted.len(),
                batch.len()
            )));
        }
        Ok(Self::new(&batch.indices, &predicted, &batch.targets))
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn predicted_labels(&self) -> Vec<usize> {
        self.predictions.iter().map(|p| p.predicted).collect()
    }

    pub fn true_labels(&self) -> Vec<usize> {
        self.predictions.iter().map(|p| p.actual).collect()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn correct(&self) -> usize {
        self.predictions.iter().filter(|p| p.is_correct()).count()
    }

    pub fn accuracy(&self) -> f32 {
        accuracy(&self.predicted_labels(), &self.true_labels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_pairs_predictions_with_truth() {
        let report = InferenceReport::new(&[4, 2, 4], &[1, 0, 0], &[1, 1, 0]);

        assert_eq!(report.len(), 3);
        assert_eq!(report.correct(), 2);
        assert_eq!(report.predictions()[1].index, 2);
        assert!(!report.predictions()[1].is_correct());
        assert_eq!(report.true_labels(), vec![1, 1, 0]);
        assert!((report.accuracy() - 2.0 / 3.0).abs() < 1e-6);
    }
}
