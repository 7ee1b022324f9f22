//! Near-duplicate groups in a synthetic two-layer embedding dataset.
//!
//! Run with `RUST_LOG=doppel=debug` to see every pipeline stage.

use doppel::dedup::DEFAULT_BATCH_SIZE;
use doppel::{Batch, Duplicates, DuplicatesConfig, KnnIvf, Percentile};
use rand::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> doppel::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("doppel=info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let n = 600;

    // Two "layers" of a model: 32-d and 8-d responses.
    let mut layer_a: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..32).map(|_| rng.random::<f32>()).collect())
        .collect();
    let mut layer_b: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..8).map(|_| rng.random::<f32>()).collect())
        .collect();

    // Plant a few near-copies: sample 10 repeated 4 times, sample 200 repeated 7 times.
    for (source, copies) in [(10usize, 4usize), (200, 7)] {
        for c in 1..=copies {
            let target = source + c * 37;
            layer_a[target] = layer_a[source].iter().map(|x| x + 1e-4 * c as f32).collect();
            layer_b[target] = layer_b[source].iter().map(|x| x + 1e-4 * c as f32).collect();
        }
    }

    let ids = (0..n).map(|i| format!("img_{i:04}.png")).collect();
    let batch = Batch::new()
        .with_field("layer_a", layer_a)?
        .with_field("layer_b", layer_b)?
        .with_sample_ids(ids)?;

    println!("=== Default (slope threshold, forest backend) ===");
    let dups = Duplicates::introspect(&batch, DEFAULT_BATCH_SIZE, &DuplicatesConfig::default())?;
    report(&dups);

    println!("\n=== Percentile 99, IVF backend ===");
    let config =
        DuplicatesConfig::new(Some(Percentile::new(99.0)?.into()), Some(KnnIvf::new().into()))?;
    let dups = Duplicates::introspect(&batch, 64, &config)?;
    report(&dups);

    Ok(())
}

fn report(dups: &Duplicates) {
    for (source, groups) in dups.iter() {
        println!(
            "{source}: {} groups (threshold {:.5})",
            groups.len(),
            dups.threshold(source).unwrap_or(f32::NAN)
        );
        for group in dups.ranked(source).unwrap_or_default().into_iter().take(5) {
            let ids = group.batch.sample_ids().unwrap_or_default();
            println!(
                "  size {:2}  mean {:.6}  std {:.6}  {:?}",
                group.size(),
                group.mean,
                group.std,
                ids
            );
        }
    }
    for (source, err) in dups.skipped() {
        println!("{source}: skipped ({err})");
    }
}
