//! Batch driver: chunked collection, scoring and persistence
//!
//! Splits a dataset into fixed-size contiguous chunks so activations for
//! an entire dataset are never held in memory at once, and so each chunk
//! is a natural checkpoint boundary (the file naming scheme carries the
//! chunk start offset; resuming from it is not implemented).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::Tensor;
use tracing::info;

use crate::collector::collect;
use crate::dataset::StatementDataset;
use crate::model::TapBackend;
use crate::scorer::evaluate;

/// Statements per chunk.
pub const CHUNK_SIZE: usize = 25;

/// Contiguous `(start, end)` chunk bounds covering `0..n`.
pub fn chunk_bounds(n: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    (0..n)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(n)))
        .collect()
}

/// Process one dataset: per chunk, collect activations and labels, then
/// write one safetensors file per (layer, chunk) and one labels file per
/// chunk under `<output_dir>/<model_size>/<dataset_name>/`.
pub fn run_dataset(
    model: &dyn TapBackend,
    dataset: &StatementDataset,
    dataset_name: &str,
    model_size: &str,
    layers: &[usize],
    output_dir: &Path,
) -> Result<()> {
    let save_dir = output_dir.join(model_size).join(dataset_name);
    std::fs::create_dir_all(&save_dir)
        .with_context(|| format!("failed to create {}", save_dir.display()))?;

    let bounds = chunk_bounds(dataset.len(), CHUNK_SIZE);
    info!(
        "Dataset '{}': {} statements in {} chunk(s)",
        dataset_name,
        dataset.len(),
        bounds.len()
    );

    for (start, end) in bounds {
        info!("Chunk {}..{}", start, end);
        let statements = &dataset.statements()[start..end];

        let acts = collect(model, statements, layers)?;
        let labels = evaluate(
            model,
            statements,
            &dataset.correct_answers()[start..end],
            &dataset.incorrect_answers()[start..end],
        )?;

        for (layer, act) in &acts {
            let path = save_dir.join(format!("layer_{layer}_{start}.safetensors"));
            let tensors: HashMap<String, Tensor> =
                HashMap::from([("activations".to_string(), act.clone())]);
            candle_core::safetensors::save(&tensors, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let labels_path = save_dir.join(format!("labels_{start}.json"));
        std::fs::write(&labels_path, serde_json::to_string(&labels)?)
            .with_context(|| format!("failed to write {}", labels_path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_bounds_exact_multiple() {
        let bounds = chunk_bounds(50, 25);
        assert_eq!(bounds, vec![(0, 25), (25, 50)]);
    }

    #[test]
    fn test_chunk_bounds_ragged_tail() {
        let bounds = chunk_bounds(60, 25);
        assert_eq!(bounds, vec![(0, 25), (25, 50), (50, 60)]);
    }

    #[test]
    fn test_chunk_bounds_small_dataset() {
        assert_eq!(chunk_bounds(3, 25), vec![(0, 3)]);
        assert_eq!(chunk_bounds(0, 25), vec![]);
    }

    #[test]
    fn test_chunk_count_is_ceiling() {
        for n in 1..200 {
            let bounds = chunk_bounds(n, 25);
            assert_eq!(bounds.len(), n.div_ceil(25));
            // chunks concatenate back to 0..n in order
            let mut expected_start = 0;
            for (start, end) in &bounds {
                assert_eq!(*start, expected_start);
                assert!(end - start <= 25);
                expected_start = *end;
            }
            assert_eq!(expected_start, n);
        }
    }
}
