use std::env;

use anyhow::Context;
use log::info;
use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use batch_generator::{BatchGenerator, GeneratorConfig, InMemoryRowSource, Subset};

const EPOCHS: usize = 2;

fn default_config() -> GeneratorConfig {
    GeneratorConfig::new(10_000, 1_000, 100, 64, ["x0", "x1", "x2", "label"])
        .with_validation_split(0.2)
        .with_targets(["label"])
        .with_seed(42)
}

/// Random features with a label that is their sum.
fn synthetic_source(config: &GeneratorConfig) -> InMemoryRowSource {
    let cols = config.columns.len();
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
    let mut data = Array2::from_shape_simple_fn((config.num_entries, cols), || rng.random::<f32>());

    for mut row in data.rows_mut() {
        let sum: f32 = row.iter().take(cols - 1).sum();
        row[cols - 1] = sum;
    }

    InMemoryRowSource::new(config.columns.iter().cloned(), data)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => GeneratorConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => default_config(),
    };

    let source = synthetic_source(&config);
    let mut generator = BatchGenerator::new(config, source)?;
    info!(
        train_chunks = generator.num_train_chunks(),
        validation_chunks = generator.num_validation_chunks();
        "partition plan:\n{}",
        generator.layout()
    );

    let generator = generator.activated();
    for epoch in 1..=EPOCHS {
        let mut rows = 0;
        let mut target_sum = 0.;

        for batch in generator.train_batches() {
            let batch = batch?;
            let (_, targets) = generator.split_batch(&batch);
            rows += batch.rows();
            target_sum += targets.sum();
        }

        let validation_batches = generator
            .validation_batches()
            .collect::<batch_generator::Result<Vec<_>>>()?
            .len();

        info!(
            epoch = epoch,
            train_rows = rows,
            train_batches = generator.num_batches(Subset::Train),
            validation_batches = validation_batches,
            mean_target = target_sum / rows.max(1) as f32;
            "epoch done"
        );
    }

    Ok(())
}
