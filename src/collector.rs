//! Activation collection over statement batches
//!
//! Attaches one hook per requested layer, runs the model over each
//! statement in order, and gathers the last-token representation per
//! (statement, layer) into per-layer stacked tensors.

use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};
use candle_core::{DType, IndexOp, Tensor};
use tracing::debug;

use crate::model::{forward_text, TapBackend};

/// Resolve requested layer indices against the model's layer count.
///
/// The single value `-1` means "all layers" and expands to the full
/// range; anything else must already be a valid index.
pub fn resolve_layers(requested: &[i64], n_layers: usize) -> Result<Vec<usize>> {
    if requested == [-1] {
        return Ok((0..n_layers).collect());
    }

    let mut layers = Vec::with_capacity(requested.len());
    for &layer in requested {
        ensure!(
            layer >= 0 && (layer as usize) < n_layers,
            "layer {layer} out of range for a {n_layers}-layer model"
        );
        layers.push(layer as usize);
    }
    Ok(layers)
}

/// Collect last-token activations for `statements` at the given layers.
///
/// Returns one tensor per layer of shape `(statements.len(), hidden)`,
/// promoted to F32, rows in statement order. Hooks are detached when this
/// function returns, on success or error.
pub fn collect(
    model: &dyn TapBackend,
    statements: &[String],
    layers: &[usize],
) -> Result<HashMap<usize, Tensor>> {
    ensure!(!statements.is_empty(), "no statements to collect from");
    for &layer in layers {
        ensure!(
            layer < model.n_layers(),
            "layer {layer} out of range for a {}-layer model",
            model.n_layers()
        );
    }

    // Attach hooks; the handles detach them again when this scope exits,
    // whichever way it exits.
    let mut hooked = Vec::with_capacity(layers.len());
    for &layer in layers {
        let (hook, handle) = model.hooks().register(layer)?;
        hooked.push((layer, hook, handle));
    }

    let mut acts: HashMap<usize, Vec<Tensor>> =
        layers.iter().map(|&layer| (layer, Vec::new())).collect();

    for (i, statement) in statements.iter().enumerate() {
        debug!("statement {}/{}", i + 1, statements.len());
        forward_text(model, statement)?;

        // Slots are overwritten on the next pass; read them out now.
        for (layer, hook, _handle) in &hooked {
            let captured = match hook.take() {
                Some(tensor) => tensor,
                None => bail!("hook on layer {layer} captured nothing"),
            };
            let seq_len = captured.dim(1)?;
            let last_token = captured.i((0, seq_len - 1))?;
            acts.get_mut(layer)
                .context("layer sequence missing")?
                .push(last_token);
        }
    }

    let mut stacked = HashMap::with_capacity(layers.len());
    for (layer, seq) in acts {
        let tensor = Tensor::stack(&seq, 0)
            .and_then(|t| t.to_dtype(DType::F32))
            .with_context(|| format!("failed to stack activations for layer {layer}"))?;
        stacked.insert(layer, tensor);
    }

    Ok(stacked)
}
