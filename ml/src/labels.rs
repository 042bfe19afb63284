use crate::error::LabelLoadError;
use serde::Deserialize;
use std::{fs, path::Path};

/// Entries accepted in the label file: a bare class id or a one-hot row.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelEntry {
    Class(usize),
    OneHot(Vec<f32>),
}

/// Loads the index-aligned label list of the dataset.
#[derive(Clone, Copy, Debug)]
pub struct LabelStore {
    num_classes: usize,
}

impl LabelStore {
    pub fn new(num_classes: usize) -> Self {
        assert!(num_classes > 0, "a label store needs at least one class");
        Self { num_classes }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Reads a JSON array of labels from `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<usize>, LabelLoadError> {
        let bytes = fs::read(path).map_err(|source| LabelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&bytes)
    }

    /// Parses `[0, 1, ...]` or `[[1, 0], [0, 1], ...]` into class ids.
    pub fn parse(&self, bytes: &[u8]) -> Result<Vec<usize>, LabelLoadError> {
        let entries: Vec<LabelEntry> = serde_json::from_slice(bytes)?;
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| self.class_of(index, entry))
            .collect()
    }

    fn class_of(&self, index: usize, entry: LabelEntry) -> Result<usize, LabelLoadError> {
        let invalid = |reason: String| LabelLoadError::InvalidEntry { index, reason };
        match entry {
            LabelEntry::Class(class) if class < self.num_classes => Ok(class),
            LabelEntry::Class(class) => Err(invalid(format!(
                "class {class} out of range for {} classes",
                self.num_classes
            ))),
            LabelEntry::OneHot(row) => {
                if row.len() != self.num_classes {
                    return Err(invalid(format!(
                        "one-hot row has {} entries, expected {}",
                        row.len(),
                        self.num_classes
                    )));
                }
                let hot: Vec<usize> = row
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| **value != 0.0)
                    .map(|(class, _)| class)
                    .collect();
                match hot.as_slice() {
                    [class] if row[*class] == 1.0 => Ok(*class),
                    _ => Err(invalid(format!("{row:?} is not a one-hot row"))),
                }
            }
        }
    }
}
