//! Integration tests for TAP-rs
//!
//! The pipeline is exercised end-to-end through `TinyBackend`, a small
//! deterministic in-memory model: token ids embed to their own value
//! replicated across the hidden width, each "layer" adds one, and the
//! logits are all zeros (so softmax is uniform and a text's score equals
//! its token count). Real-weights runs go through the same `TapBackend`
//! seam.

use std::cell::Cell;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use tap_rs::{
    collect, evaluate, resolve_layers, run_dataset, score, HookRegistry, StatementDataset,
    TapBackend,
};
use tempfile::{NamedTempFile, TempDir};

const HIDDEN: usize = 8;
const VOCAB: usize = 16;

struct TinyBackend {
    device: Device,
    hooks: HookRegistry,
    n_layers: usize,
    /// forward passes executed so far
    calls: Cell<usize>,
    /// fail forward passes once this many have run
    fail_after: Option<usize>,
    /// hook count observed during the most recent forward pass
    observed_hooks: Cell<usize>,
}

impl TinyBackend {
    fn new(n_layers: usize) -> Self {
        Self {
            device: Device::Cpu,
            hooks: HookRegistry::new(),
            n_layers,
            calls: Cell::new(0),
            fail_after: None,
            observed_hooks: Cell::new(0),
        }
    }

    fn failing_after(n_layers: usize, calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::new(n_layers)
        }
    }
}

impl TapBackend for TinyBackend {
    fn n_layers(&self) -> usize {
        self.n_layers
    }

    fn hidden_size(&self) -> usize {
        HIDDEN
    }

    fn vocab_size(&self) -> usize {
        VOCAB
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(text.len() + 1);
        if add_bos {
            ids.push(1);
        }
        ids.extend(text.bytes().map(|b| u32::from(b) % VOCAB as u32));
        Ok(ids)
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.observed_hooks.set(self.hooks.active());

        let calls = self.calls.get() + 1;
        self.calls.set(calls);
        if let Some(limit) = self.fail_after {
            if calls > limit {
                anyhow::bail!("injected forward failure on call {calls}");
            }
        }

        let (_b, seq_len) = input_ids.dims2()?;
        let ids: Vec<u32> = input_ids.flatten_all()?.to_vec1()?;

        // embed: token id replicated across the hidden width
        let values: Vec<f32> = ids
            .iter()
            .flat_map(|&id| std::iter::repeat(id as f32).take(HIDDEN))
            .collect();
        let mut hidden = Tensor::from_vec(values, (1, seq_len, HIDDEN), &self.device)?;

        for layer in 0..self.n_layers {
            hidden = (hidden + 1.0)?;
            self.hooks.record(layer, &hidden);
        }

        Ok(Tensor::zeros((1, seq_len, VOCAB), DType::F32, &self.device)?)
    }
}

fn statements(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_collect_shapes_and_keys() {
    let model = TinyBackend::new(4);
    let stmts = statements(&["alpha", "beta", "gamma"]);

    let acts = collect(&model, &stmts, &[0, 2]).unwrap();

    let mut keys: Vec<usize> = acts.keys().copied().collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![0, 2]);
    for act in acts.values() {
        assert_eq!(act.dims(), &[3, HIDDEN]);
        assert_eq!(act.dtype(), DType::F32);
    }
}

#[test]
fn test_collect_rows_in_statement_order() {
    let model = TinyBackend::new(2);
    // last byte differs, so the last-token embedding identifies the row
    let stmts = statements(&["xa", "xb", "xc"]);

    let acts = collect(&model, &stmts, &[0]).unwrap();
    let rows: Vec<Vec<f32>> = acts[&0].to_vec2().unwrap();

    for (row, text) in rows.iter().zip(["xa", "xb", "xc"]) {
        let last_id = u32::from(*text.as_bytes().last().unwrap()) % VOCAB as u32;
        // layer 0 output = embedding + 1
        let expected = last_id as f32 + 1.0;
        assert!(row.iter().all(|&v| (v - expected).abs() < 1e-6));
    }
}

#[test]
fn test_collect_layer_outputs_differ_per_layer() {
    let model = TinyBackend::new(3);
    let stmts = statements(&["same"]);

    let acts = collect(&model, &stmts, &[0, 1, 2]).unwrap();
    let v0: Vec<Vec<f32>> = acts[&0].to_vec2().unwrap();
    let v2: Vec<Vec<f32>> = acts[&2].to_vec2().unwrap();

    // each layer adds one
    assert!((v2[0][0] - v0[0][0] - 2.0).abs() < 1e-6);
}

#[test]
fn test_hooks_attached_during_collect_and_detached_after() {
    let model = TinyBackend::new(4);
    let stmts = statements(&["one", "two"]);

    collect(&model, &stmts, &[0, 1, 3]).unwrap();

    assert_eq!(model.observed_hooks.get(), 3);
    assert_eq!(model.hooks().active(), 0);
}

#[test]
fn test_hooks_detached_after_mid_batch_failure() {
    // second forward pass fails, with hooks already attached
    let model = TinyBackend::failing_after(4, 1);
    let stmts = statements(&["one", "two", "three"]);

    assert!(collect(&model, &stmts, &[0, 1]).is_err());
    assert_eq!(model.observed_hooks.get(), 2);
    assert_eq!(model.hooks().active(), 0);
}

#[test]
fn test_collect_rejects_bad_input() {
    let model = TinyBackend::new(4);
    assert!(collect(&model, &[], &[0]).is_err());
    assert!(collect(&model, &statements(&["x"]), &[4]).is_err());
}

#[test]
fn test_score_is_deterministic_and_length_dominated() {
    let model = TinyBackend::new(2);

    let a = score(&model, "hello").unwrap();
    let b = score(&model, "hello").unwrap();
    assert_eq!(a, b);

    // uniform logits: score == token count (BOS + one per byte)
    assert!((a - 6.0).abs() < 1e-4);
    let longer = score(&model, "hello there").unwrap();
    assert!(longer > a);
}

#[test]
fn test_evaluate_labels_and_order() {
    let model = TinyBackend::new(2);
    let stmts = statements(&["first", "second"]);
    let correct = statements(&["a much longer answer", "no"]);
    let incorrect = vec![
        statements(&["short", "tiny"]),
        statements(&["a far longer wrong answer"]),
    ];

    let labels = evaluate(&model, &stmts, &correct, &incorrect).unwrap();

    // longer completions score higher under the summed-softmax aggregate
    assert_eq!(labels, vec![true, false]);
}

#[test]
fn test_evaluate_tie_is_false() {
    let model = TinyBackend::new(2);
    let stmts = statements(&["statement"]);
    // same length as the correct answer -> identical score -> tie loses
    let correct = statements(&["abcd"]);
    let incorrect = vec![statements(&["wxyz"])];

    let labels = evaluate(&model, &stmts, &correct, &incorrect).unwrap();
    assert_eq!(labels, vec![false]);
}

#[test]
fn test_evaluate_requires_incorrect_answers() {
    let model = TinyBackend::new(2);
    let stmts = statements(&["statement"]);
    let correct = statements(&["yes"]);
    let incorrect = vec![Vec::new()];

    assert!(evaluate(&model, &stmts, &correct, &incorrect).is_err());
}

#[test]
fn test_resolve_layers_sentinel() {
    assert_eq!(resolve_layers(&[-1], 3).unwrap(), vec![0, 1, 2]);
}

fn write_dataset(rows: &[(&str, &str, &str)]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "statement,correct_answer,incorrect_answers").unwrap();
    for (statement, correct, incorrect) in rows {
        writeln!(file, "{statement},{correct},{incorrect}").unwrap();
    }
    file
}

fn load_activations(path: &Path) -> Tensor {
    let tensors = candle_core::safetensors::load(path, &Device::Cpu).unwrap();
    tensors["activations"].clone()
}

#[test]
fn test_run_dataset_end_to_end() {
    let model = TinyBackend::new(2);
    let file = write_dataset(&[
        ("the sky is", "blue and bright", "red"),
        ("grass is", "green", "a long purple shade"),
        ("water is", "wet and clear", "dry"),
    ]);
    let dataset = StatementDataset::load(file.path()).unwrap();
    let output = TempDir::new().unwrap();

    run_dataset(&model, &dataset, "colors", "13B", &[0, 1], output.path()).unwrap();

    let save_dir = output.path().join("13B").join("colors");
    for layer in [0, 1] {
        let acts = load_activations(&save_dir.join(format!("layer_{layer}_0.safetensors")));
        assert_eq!(acts.dims(), &[3, HIDDEN]);
    }

    let labels: Vec<bool> =
        serde_json::from_str(&std::fs::read_to_string(save_dir.join("labels_0.json")).unwrap())
            .unwrap();
    assert_eq!(labels, vec![true, false, true]);

    // all hooks released across chunks
    assert_eq!(model.hooks().active(), 0);
}

#[test]
fn test_run_dataset_chunking() {
    let model = TinyBackend::new(1);
    let rows: Vec<(String, String, String)> = (0..27)
        .map(|i| (format!("statement {i}"), "yes".to_string(), "no".to_string()))
        .collect();
    let row_refs: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(s, c, i)| (s.as_str(), c.as_str(), i.as_str()))
        .collect();
    let file = write_dataset(&row_refs);
    let dataset = StatementDataset::load(file.path()).unwrap();
    let output = TempDir::new().unwrap();

    run_dataset(&model, &dataset, "facts", "7B", &[0], output.path()).unwrap();

    let save_dir = output.path().join("7B").join("facts");
    let first = load_activations(&save_dir.join("layer_0_0.safetensors"));
    let second = load_activations(&save_dir.join("layer_0_25.safetensors"));
    assert_eq!(first.dims(), &[25, HIDDEN]);
    assert_eq!(second.dims(), &[2, HIDDEN]);

    let labels: Vec<bool> =
        serde_json::from_str(&std::fs::read_to_string(save_dir.join("labels_25.json")).unwrap())
            .unwrap();
    assert_eq!(labels.len(), 2);
}
