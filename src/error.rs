use std::{error::Error, fmt, io};

use crate::partition::Subset;

/// The batch generator's result type.
pub type Result<T> = std::result::Result<T, GeneratorErr>;

/// Rejected generator configurations, raised before any data is touched.
#[derive(Debug)]
pub enum ConfigErr {
    ZeroNumEntries,
    ZeroChunkSize,
    ZeroRangeSize,
    ZeroBatchSize,
    BatchLargerThanChunk { batch_size: usize, chunk_size: usize },
    InvalidValidationSplit(f32),
    NoColumns,
    UnknownTarget(String),
    ZeroPrefetchThreshold,
    Parse(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::ZeroNumEntries => f.write_str("num_entries must be > 0"),
            ConfigErr::ZeroChunkSize => f.write_str("chunk_size must be > 0"),
            ConfigErr::ZeroRangeSize => f.write_str("range_size must be > 0"),
            ConfigErr::ZeroBatchSize => f.write_str("batch_size must be > 0"),
            ConfigErr::BatchLargerThanChunk {
                batch_size,
                chunk_size,
            } => write!(
                f,
                "batch_size ({batch_size}) cannot be larger than chunk_size ({chunk_size})"
            ),
            ConfigErr::InvalidValidationSplit(split) => {
                write!(f, "validation_split must be in [0, 1), got {split}")
            }
            ConfigErr::NoColumns => f.write_str("at least one column must be selected"),
            ConfigErr::UnknownTarget(name) => {
                write!(f, "target column '{name}' is not among the selected columns")
            }
            ConfigErr::ZeroPrefetchThreshold => f.write_str("prefetch_threshold must be > 0"),
            ConfigErr::Parse(e) => write!(f, "invalid config: {e}"),
            ConfigErr::Io(e) => write!(f, "cannot read config: {e}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::Parse(e) => Some(e),
            ConfigErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<io::Error> for ConfigErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Failures reported by a `RowSource` while materializing a range of rows.
#[derive(Debug)]
pub enum RowSourceErr {
    UnknownColumn(String),
    OutOfBounds {
        start: usize,
        end: usize,
        num_entries: usize,
    },
    BufferTooSmall {
        needed: usize,
        available: usize,
    },
    Io(io::Error),
    Other(String),
}

impl fmt::Display for RowSourceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSourceErr::UnknownColumn(name) => write!(f, "unknown column '{name}'"),
            RowSourceErr::OutOfBounds {
                start,
                end,
                num_entries,
            } => write!(
                f,
                "rows [{start}, {end}) are out of bounds for a source of {num_entries} entries"
            ),
            RowSourceErr::BufferTooSmall { needed, available } => write!(
                f,
                "output buffer too small: needed {needed} rows, {available} available"
            ),
            RowSourceErr::Io(e) => write!(f, "io error: {e}"),
            RowSourceErr::Other(msg) => f.write_str(msg),
        }
    }
}

impl Error for RowSourceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RowSourceErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RowSourceErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Batch generator runtime failures.
#[derive(Debug)]
pub enum GeneratorErr {
    Config(ConfigErr),
    RowSource {
        subset: Subset,
        chunk: usize,
        source: RowSourceErr,
    },
    ChunkOutOfRange {
        subset: Subset,
        chunk: usize,
        num_chunks: usize,
    },
    Inactive,
    LoaderPanicked,
}

impl fmt::Display for GeneratorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorErr::Config(e) => write!(f, "configuration error: {e}"),
            GeneratorErr::RowSource {
                subset,
                chunk,
                source,
            } => write!(f, "failed to load {subset} chunk {chunk}: {source}"),
            GeneratorErr::ChunkOutOfRange {
                subset,
                chunk,
                num_chunks,
            } => write!(
                f,
                "{subset} chunk {chunk} out of range, the subset has {num_chunks} chunks"
            ),
            GeneratorErr::Inactive => {
                f.write_str("the generator is not active and has no queued batches")
            }
            GeneratorErr::LoaderPanicked => f.write_str("the prefetch thread panicked"),
        }
    }
}

impl Error for GeneratorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GeneratorErr::Config(e) => Some(e),
            GeneratorErr::RowSource { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigErr> for GeneratorErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ConfigErr> for io::Error {
    fn from(value: ConfigErr) -> Self {
        match value {
            ConfigErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

impl From<GeneratorErr> for io::Error {
    fn from(value: GeneratorErr) -> Self {
        match value {
            GeneratorErr::RowSource {
                source: RowSourceErr::Io(e),
                ..
            } => e,
            GeneratorErr::Config(e) => e.into(),
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_source_error_keeps_its_cause() {
        let err = GeneratorErr::RowSource {
            subset: Subset::Train,
            chunk: 3,
            source: RowSourceErr::Io(io::Error::other("disk gone")),
        };

        assert_eq!(
            err.to_string(),
            "failed to load train chunk 3: io error: disk gone"
        );
        assert!(err.source().is_some());

        let io_err: io::Error = err.into();
        assert_eq!(io_err.to_string(), "disk gone");
    }

    #[test]
    fn config_errors_map_to_invalid_input() {
        let err = GeneratorErr::from(ConfigErr::BatchLargerThanChunk {
            batch_size: 20,
            chunk_size: 10,
        });

        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
    }
}
