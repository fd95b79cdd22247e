use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigErr;

/// The configuration of a `BatchGenerator`.
///
/// Only the sizes and the column selection are required, every other field has
/// a default when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub num_entries: usize,
    pub chunk_size: usize,
    pub range_size: usize,
    pub batch_size: usize,
    #[serde(default)]
    pub validation_split: f64,
    pub columns: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub drop_remainder: bool,
    #[serde(default = "default_prefetch_threshold")]
    pub prefetch_threshold: usize,
    #[serde(default)]
    pub background_prefetch: bool,
}

fn default_true() -> bool {
    true
}

fn default_prefetch_threshold() -> usize {
    1
}

impl GeneratorConfig {
    /// Creates a new config with every optional field set to its default.
    ///
    /// # Arguments
    /// * `num_entries` - Total amount of entries in the dataset.
    /// * `chunk_size` - Amount of entries loaded per chunk.
    /// * `range_size` - Amount of contiguous entries per range.
    /// * `batch_size` - Amount of rows per batch.
    /// * `columns` - The columns to load, in output order.
    pub fn new<C: Into<String>>(
        num_entries: usize,
        chunk_size: usize,
        range_size: usize,
        batch_size: usize,
        columns: impl IntoIterator<Item = C>,
    ) -> Self {
        Self {
            num_entries,
            chunk_size,
            range_size,
            batch_size,
            validation_split: 0.,
            columns: columns.into_iter().map(Into::into).collect(),
            targets: Vec::new(),
            shuffle: true,
            seed: None,
            drop_remainder: true,
            prefetch_threshold: default_prefetch_threshold(),
            background_prefetch: false,
        }
    }

    pub fn with_validation_split(mut self, validation_split: f64) -> Self {
        self.validation_split = validation_split;
        self
    }

    pub fn with_targets<C: Into<String>>(mut self, targets: impl IntoIterator<Item = C>) -> Self {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_drop_remainder(mut self, drop_remainder: bool) -> Self {
        self.drop_remainder = drop_remainder;
        self
    }

    pub fn with_prefetch_threshold(mut self, prefetch_threshold: usize) -> Self {
        self.prefetch_threshold = prefetch_threshold;
        self
    }

    pub fn with_background_prefetch(mut self, background_prefetch: bool) -> Self {
        self.background_prefetch = background_prefetch;
        self
    }

    /// Parses a config from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigErr> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config from a JSON file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that the config describes a valid generator.
    ///
    /// # Returns
    /// The first violated constraint as a `ConfigErr`.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.num_entries == 0 {
            return Err(ConfigErr::ZeroNumEntries);
        }
        if self.chunk_size == 0 {
            return Err(ConfigErr::ZeroChunkSize);
        }
        if self.range_size == 0 {
            return Err(ConfigErr::ZeroRangeSize);
        }
        if self.batch_size == 0 {
            return Err(ConfigErr::ZeroBatchSize);
        }
        if self.batch_size > self.chunk_size {
            return Err(ConfigErr::BatchLargerThanChunk {
                batch_size: self.batch_size,
                chunk_size: self.chunk_size,
            });
        }
        if !(0. ..1.).contains(&self.validation_split) {
            return Err(ConfigErr::InvalidValidationSplit(self.validation_split as f32));
        }
        if self.columns.is_empty() {
            return Err(ConfigErr::NoColumns);
        }
        if let Some(target) = self.targets.iter().find(|t| !self.columns.contains(t)) {
            return Err(ConfigErr::UnknownTarget(target.clone()));
        }
        if self.prefetch_threshold == 0 {
            return Err(ConfigErr::ZeroPrefetchThreshold);
        }

        Ok(())
    }

    /// Indices into `columns` of the target columns, in `targets` order.
    pub fn target_indices(&self) -> Vec<usize> {
        self.targets
            .iter()
            .filter_map(|t| self.columns.iter().position(|c| c == t))
            .collect()
    }

    /// Indices into `columns` of every column that isn't a target.
    pub fn feature_indices(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&i| !self.targets.contains(&self.columns[i]))
            .collect()
    }
}
