pub mod assembler;
pub mod buffer;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod generator;
pub mod partition;
pub mod source;

pub use buffer::{Batch, RowBuffer};
pub use config::GeneratorConfig;
pub use error::{ConfigErr, GeneratorErr, Result, RowSourceErr};
pub use generator::{BatchGenerator, BatchPoll, GeneratorState};
pub use partition::{RangePartitioner, Subset};
pub use source::{InMemoryRowSource, RowSource};
