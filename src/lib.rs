// Pedantic clippy configuration for ML/math codebase
// These are acceptable in numerical/ML code:
#![allow(clippy::cast_precision_loss)] // usize→f64/f32 intentional in ML
#![allow(clippy::cast_possible_truncation)] // usize→u32 in tensor indexing
#![allow(clippy::cast_possible_wrap)] // usize→i64 in tensor ops
#![allow(clippy::many_single_char_names)] // x, q, k, v standard in math
#![allow(clippy::similar_names)] // related variables like `head`/`heads`
#![allow(clippy::module_name_repetitions)] // TapLlama in forward_llama.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::cast_sign_loss)] // i64→usize when value is known positive

//! TAP-rs: Truth Activation Probing
//!
//! Records intermediate-layer activations from a LLaMA-family model while
//! it reads short factual statements, and scores whether the model
//! prefers each statement's correct completion over its incorrect ones.
//!
//! ## Architecture
//!
//! - `config`: weights directory resolution from an external config file
//! - `dataset`: CSV statement datasets (statement / correct / incorrect)
//! - `hook`: single-slot layer hooks with RAII detach
//! - `masks`: shared causal-mask utilities
//! - `forward_llama`: LLaMA forward pass with per-layer hook dispatch
//! - `model`: the `TapBackend` seam plus device/dtype policy and loading
//! - `collector`: batched last-token activation collection
//! - `scorer`: completion scoring and preference labels
//! - `driver`: chunked orchestration and safetensors persistence

pub mod collector;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod forward_llama;
pub mod hook;
pub mod masks;
pub mod model;
pub mod scorer;

pub use collector::{collect, resolve_layers};
pub use config::WeightsConfig;
pub use dataset::StatementDataset;
pub use driver::{chunk_bounds, run_dataset, CHUNK_SIZE};
pub use forward_llama::{LlamaConfig, TapLlama};
pub use hook::{HookHandle, HookRegistry, LayerHook};
pub use model::{forward_text, load_model, parse_device, select_dtype, TapBackend};
pub use scorer::{evaluate, preference_label, score};
