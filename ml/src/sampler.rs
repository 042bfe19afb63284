use crate::dataset::{BoozeBatch, BoozeBatcher, DatasetCache, Example};
use burn::{data::dataloader::batcher::Batcher, data::dataset::Dataset, tensor::backend::Backend};
use rand::Rng;

/// Draws random minibatches, with replacement, from a shared [`DatasetCache`].
#[derive(Clone)]
pub struct BatchSampler<B: Backend> {
    dataset: DatasetCache,
    batcher: BoozeBatcher<B>,
    device: B::Device,
}

impl<B: Backend> BatchSampler<B> {
    pub fn new(dataset: DatasetCache, device: B::Device) -> Self {
        let batcher = dataset.batcher::<B>();
        Self {
            dataset,
            batcher,
            device,
        }
    }

    pub fn dataset(&self) -> &DatasetCache {
        &self.dataset
    }

    /// Samples `batch_size` examples uniformly with replacement.
    ///
    /// `batch_size` may exceed the dataset length; duplicates are expected.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> BoozeBatch<B> {
        let indices = self.draw_indices(rng, batch_size);
        self.gather(&indices)
    }

    /// Draws `batch_size` independent indices in `[0, len)`.
    pub fn draw_indices<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Vec<usize> {
        assert!(batch_size > 0, "batch size must be positive");
        let len = self.dataset.len();
        (0..batch_size).map(|_| rng.gen_range(0..len)).collect()
    }

    /// Builds a batch from explicit indices, in the given order.
    ///
    /// Pixels and label of a slot always come from the same example.
    pub fn gather(&self, indices: &[usize]) -> BoozeBatch<B> {
        let items: Vec<Example> = indices
            .iter()
            .map(|&index| {
                self.dataset.get(index).unwrap_or_else(|| {
                    panic!(
                        "index {index} out of range for dataset of {}",
                        self.dataset.len()
                    )
                })
            })
            .collect();
        self.batcher.batch(items, &self.device)
    }
}
