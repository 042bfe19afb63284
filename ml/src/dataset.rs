use crate::{
    decoder::{CHANNELS, ImageDecoder},
    error::DatasetBuildError,
    labels::LabelStore,
};
use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    tensor::{Tensor, TensorData, backend::Backend},
};
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub const NUM_CLASSES: usize = 2;
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["beer", "wine"];
pub const LABELS_FILE: &str = "labels.json";

/// Name of a class id, or `"?"` when out of range.
pub fn class_name(class: usize) -> &'static str {
    CLASS_NAMES.get(class).copied().unwrap_or("?")
}

/// On-disk dataset: `file1.jpg ..= file{count}.jpg` plus `labels.json`.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub count: usize,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>, count: usize) -> Self {
        Self {
            root: root.into(),
            count,
        }
    }

    /// Image paths in dataset order (one-based file names).
    pub fn image_refs(&self) -> Vec<PathBuf> {
        (1..=self.count)
            .map(|n| self.root.join(format!("file{n}.jpg")))
            .collect()
    }

    pub fn label_ref(&self) -> PathBuf {
        self.root.join(LABELS_FILE)
    }
}

/// A decoded, labelled image. Immutable once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Example {
    pub index: usize,
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// The whole dataset decoded into memory, shared read-only by samplers.
#[derive(Clone, Debug)]
pub struct DatasetCache {
    examples: Arc<Vec<Example>>,
    width: u32,
    height: u32,
}

impl DatasetCache {
    /// Decodes the dataset described by `layout`.
    pub fn from_layout(
        layout: &DatasetLayout,
        decoder: &ImageDecoder,
    ) -> Result<Self, DatasetBuildError> {
        Self::build(&layout.image_refs(), &layout.label_ref(), decoder)
    }

    /// Decodes every image and loads the labels concurrently, then joins.
    ///
    /// Each decoded image lands at its source index regardless of completion
    /// order. Any failure discards everything decoded so far.
    pub fn build(
        image_refs: &[PathBuf],
        label_ref: &Path,
        decoder: &ImageDecoder,
    ) -> Result<Self, DatasetBuildError> {
        log::info!(
            "Building dataset from {} images ({}x{})",
            image_refs.len(),
            decoder.image_size().0,
            decoder.image_size().1
        );
        let store = LabelStore::new(NUM_CLASSES);

        let (labels, pixels) = rayon::join(
            || store.load(label_ref),
            || {
                image_refs
                    .par_iter()
                    .enumerate()
                    .map(|(index, path)| {
                        decoder
                            .decode_path(path)
                            .map_err(|source| DatasetBuildError::Decode { index, source })
                    })
                    .collect::<Result<Vec<_>, _>>()
            },
        );
        let pixels = pixels?;
        let labels = labels?;

        if pixels.len() != labels.len() {
            return Err(DatasetBuildError::LengthMismatch {
                images: pixels.len(),
                labels: labels.len(),
            });
        }

        let examples = pixels
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (pixels, label))| Example {
                index,
                pixels,
                label,
            })
            .collect();

        let (width, height) = decoder.image_size();
        let dataset = Self::from_examples(examples, width, height)?;
        log::info!("Dataset ready: {} examples", dataset.len());
        Ok(dataset)
    }

    /// Wraps already decoded examples, checking the dataset invariants.
    pub fn from_examples(
        examples: Vec<Example>,
        width: u32,
        height: u32,
    ) -> Result<Self, DatasetBuildError> {
        if examples.is_empty() {
            return Err(DatasetBuildError::Empty);
        }
        let expected = width as usize * height as usize * CHANNELS;
        for example in &examples {
            if example.pixels.len() != expected {
                return Err(DatasetBuildError::PixelLength {
                    index: example.index,
                    expected,
                    actual: example.pixels.len(),
                });
            }
            if example.label >= NUM_CLASSES {
                return Err(DatasetBuildError::LabelOutOfRange {
                    index: example.index,
                    label: example.label,
                    num_classes: NUM_CLASSES,
                });
            }
        }

        Ok(Self {
            examples: Arc::new(examples),
            width,
            height,
        })
    }

    /// Returns `(width, height)`.
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Labels in dataset order.
    pub fn labels(&self) -> Vec<usize> {
        self.examples.iter().map(|example| example.label).collect()
    }

    /// Batch assembler matching this dataset's geometry.
    pub fn batcher<B: Backend>(&self) -> BoozeBatcher<B> {
        BoozeBatcher::new(self.height as usize, self.width as usize)
    }
}

impl Dataset<Example> for DatasetCache {
    fn get(&self, index: usize) -> Option<Example> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}

/// Images stacked as `[batch, height, width, channels]` with one-hot labels.
///
/// Dropping the batch releases its tensor buffers.
#[derive(Clone, Debug)]
pub struct BoozeBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 2>,
    /// Dataset index behind each slot.
    pub indices: Vec<usize>,
    /// Class id behind each slot.
    pub targets: Vec<usize>,
}

impl<B: Backend> BoozeBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// One-hot vector of length `num_classes` with a 1 at `class`.
pub fn one_hot(class: usize, num_classes: usize) -> Vec<f32> {
    let mut row = vec![0.0; num_classes];
    row[class] = 1.0;
    row
}

/// Stacks examples into a [`BoozeBatch`], keeping slot order.
#[derive(Clone)]
pub struct BoozeBatcher<B: Backend> {
    height: usize,
    width: usize,
    _marker: std::marker::PhantomData<B>,
}

impl<B: Backend> BoozeBatcher<B> {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, Example, BoozeBatch<B>> for BoozeBatcher<B> {
    fn batch(&self, items: Vec<Example>, device: &B::Device) -> BoozeBatch<B> {
        let batch_size = items.len();
        let mut pixels = Vec::with_capacity(batch_size * self.height * self.width * CHANNELS);
        let mut labels = Vec::with_capacity(batch_size * NUM_CLASSES);
        let mut indices = Vec::with_capacity(batch_size);
        let mut targets = Vec::with_capacity(batch_size);

        for example in items {
            pixels.extend_from_slice(&example.pixels);
            labels.extend(one_hot(example.label, NUM_CLASSES));
            indices.push(example.index);
            targets.push(example.label);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, self.height, self.width, CHANNELS]),
            device,
        );
        let labels =
            Tensor::<B, 2>::from_data(TensorData::new(labels, [batch_size, NUM_CLASSES]), device);

        BoozeBatch {
            images,
            labels,
            indices,
            targets,
        }
    }
}
