mod common;

use std::{
    collections::HashSet,
    io,
    panic::{self, AssertUnwindSafe},
};

use batch_generator::{BatchGenerator, BatchPoll, GeneratorErr, GeneratorState, Subset};

use common::{Flaky, PanicsOnce, config, entries, indexed_source, sorted};

/// Runs one epoch of `subset`, returning the entries of every delivered batch.
fn epoch<S>(generator: &BatchGenerator<S>, subset: Subset) -> io::Result<Vec<Vec<usize>>>
where
    S: batch_generator::RowSource + Send + 'static,
{
    let batches = match subset {
        Subset::Train => generator.train_batches(),
        Subset::Validation => generator.validation_batches(),
    };

    let mut out = Vec::new();
    for batch in batches {
        out.push(entries(&batch?));
    }

    Ok(out)
}

#[test]
fn unshuffled_epochs_deliver_each_entry_once() -> io::Result<()> {
    let config = config(1000).with_shuffle(false).with_drop_remainder(false);
    let mut generator = BatchGenerator::new(config, indexed_source(1000))?;
    generator.activate();

    let train: Vec<usize> = epoch(&generator, Subset::Train)?.concat();
    let validation: Vec<usize> = epoch(&generator, Subset::Validation)?.concat();

    assert_eq!(train.len(), 700);
    assert_eq!(validation.len(), 300);

    let train_set: HashSet<_> = train.iter().copied().collect();
    let validation_set: HashSet<_> = validation.iter().copied().collect();
    assert_eq!(train_set.len(), 700);
    assert!(train_set.is_disjoint(&validation_set));

    let all = sorted(train.into_iter().chain(validation).collect());
    assert_eq!(all, (0..1000).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn unshuffled_rows_keep_their_range_order() -> io::Result<()> {
    let config = config(1000).with_shuffle(false);
    let mut generator = BatchGenerator::new(config, indexed_source(1000))?;
    generator.activate();

    let train = epoch(&generator, Subset::Train)?.concat();
    // Ranges are contiguous runs of at most 10 entries, so unshuffled rows
    // mostly ascend.
    let ascending = train.windows(2).filter(|w| w[1] == w[0] + 1).count();
    assert!(ascending >= train.len() * 8 / 10);
    Ok(())
}

#[test]
fn drop_remainder_delivers_only_full_batches() -> io::Result<()> {
    let mut generator = BatchGenerator::new(config(1005), indexed_source(1005))?;
    generator.activate();

    for _ in 0..2 {
        let batches = epoch(&generator, Subset::Train)?;

        assert_eq!(batches.len(), generator.num_batches(Subset::Train));
        assert!(batches.iter().all(|b| b.len() == 10));

        let delivered = batches.concat();
        let unique: HashSet<_> = delivered.iter().collect();
        assert_eq!(unique.len(), delivered.len());
        assert_eq!(
            delivered.len() + generator.last_batch_rows(Subset::Train),
            generator.layout().train.entries
        );
    }

    assert_eq!(generator.epochs_completed(Subset::Train), 2);
    Ok(())
}

#[test]
fn keeping_the_remainder_ends_with_a_short_batch() -> io::Result<()> {
    let config = config(1005).with_drop_remainder(false);
    let mut generator = BatchGenerator::new(config, indexed_source(1005))?;
    generator.activate();

    let batches = epoch(&generator, Subset::Validation)?;
    let last = batches.last().map_or(0, Vec::len);

    assert_eq!(batches.len(), generator.num_batches(Subset::Validation));
    assert_eq!(last, generator.last_batch_rows(Subset::Validation));
    assert_eq!(batches.concat().len(), generator.layout().validation.entries);
    Ok(())
}

#[test]
fn every_epoch_covers_the_same_entries_in_a_new_order() -> io::Result<()> {
    let mut generator = BatchGenerator::new(config(1000), indexed_source(1000))?;
    generator.activate();

    let first = epoch(&generator, Subset::Train)?.concat();
    let second = epoch(&generator, Subset::Train)?.concat();

    assert_ne!(first, second);
    assert_eq!(sorted(first), sorted(second));
    Ok(())
}

#[test]
fn same_seed_same_batches() -> io::Result<()> {
    let mut a = BatchGenerator::new(config(800), indexed_source(800))?;
    let mut b = BatchGenerator::new(config(800), indexed_source(800))?;
    a.activate();
    b.activate();

    for _ in 0..2 {
        assert_eq!(epoch(&a, Subset::Train)?, epoch(&b, Subset::Train)?);
    }
    Ok(())
}

#[test]
fn empty_validation_subset() -> io::Result<()> {
    let config = config(500).with_validation_split(0.);
    let mut generator = BatchGenerator::new(config, indexed_source(500))?;
    generator.activate();

    assert_eq!(generator.num_validation_chunks(), 0);
    assert_eq!(generator.get_validation_batch()?, None);
    assert_eq!(generator.validation_batches().count(), 0);
    assert_eq!(epoch(&generator, Subset::Train)?.concat().len(), 500);
    Ok(())
}

#[test]
fn single_threaded_polls_never_pend() -> io::Result<()> {
    // 50 train entries: one chunk of 45 rows and a remainder chunk of 5 rows.
    let mut config = config(100).with_validation_split(0.5);
    config.chunk_size = 45;
    config.batch_size = 45;
    let mut generator = BatchGenerator::new(config.with_drop_remainder(false), indexed_source(100))?;
    generator.activate();

    let mut polls = Vec::new();
    loop {
        match generator.poll_train_batch()? {
            BatchPoll::Ready(batch) => polls.push(Some(batch.rows())),
            BatchPoll::Pending => polls.push(None),
            BatchPoll::EpochDone => break,
        }
    }

    assert_eq!(polls, vec![Some(45), Some(5)]);
    Ok(())
}

#[test]
fn ending_an_epoch_early_starts_a_fresh_one() -> io::Result<()> {
    let mut generator = BatchGenerator::new(config(1000), indexed_source(1000))?;
    generator.activate();

    for _ in 0..3 {
        generator.get_train_batch()?;
    }
    generator.end_epoch(Subset::Train);

    assert_eq!(generator.queue_depth(Subset::Train), 0);
    assert_eq!(generator.epochs_completed(Subset::Train), 0);

    let batches = epoch(&generator, Subset::Train)?;
    assert_eq!(batches.len(), 70);
    assert_eq!(generator.epochs_completed(Subset::Train), 1);
    Ok(())
}

#[test]
fn guard_deactivates_on_drop() -> io::Result<()> {
    let mut generator = BatchGenerator::new(config(1000), indexed_source(1000))?;

    {
        let active = generator.activated();
        assert_eq!(active.state(), GeneratorState::Active);
        assert!(active.get_train_batch()?.is_some());
    }

    assert_eq!(generator.state(), GeneratorState::Idle);
    Ok(())
}

#[test]
fn source_failures_surface_as_io_errors_and_can_be_retried() {
    let source = Flaky::new(indexed_source(1000), 2);
    let config = config(1000).with_drop_remainder(false);
    let mut generator = BatchGenerator::new(config, source).unwrap();
    generator.activate();

    let err: io::Error = generator.get_train_batch().unwrap_err().into();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);

    let rows: usize = generator
        .train_batches()
        .map(|batch| batch.map(|b| b.rows()))
        .sum::<Result<usize, GeneratorErr>>()
        .unwrap();
    assert_eq!(rows, 700);
}

#[test]
fn a_caught_source_panic_does_not_stall_the_epoch() -> io::Result<()> {
    let config = config(1000).with_drop_remainder(false);
    let mut generator = BatchGenerator::new(config, PanicsOnce::new(indexed_source(1000)))?;
    generator.activate();

    let caught = panic::catch_unwind(AssertUnwindSafe(|| generator.get_train_batch()));
    assert!(caught.is_err());

    let rows: usize = epoch(&generator, Subset::Train)?.iter().map(Vec::len).sum();
    assert_eq!(rows, 700);
    Ok(())
}
