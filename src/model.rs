//! Backend seam and model loading
//!
//! [`TapBackend`] is the interface the collector, scorer and driver work
//! against: metadata, tokenization, hook-registry access and the forward
//! pass. `TapLlama` is the one production implementation; tests drive the
//! pipeline through small in-memory backends instead.

use std::path::Path;

use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use tracing::info;

use crate::config::WeightsConfig;
use crate::forward_llama::TapLlama;
use crate::hook::HookRegistry;

/// Interface between the model and the extraction pipeline.
pub trait TapBackend {
    // --- Metadata ---
    fn n_layers(&self) -> usize;
    fn hidden_size(&self) -> usize;
    fn vocab_size(&self) -> usize;
    fn device(&self) -> &Device;

    /// Registry the forward pass reports layer outputs to.
    fn hooks(&self) -> &HookRegistry;

    /// Tokenize `text`, optionally prepending the BOS marker.
    fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>>;

    /// Single forward pass over `input_ids` (shape `(1, seq)`), returning
    /// logits of shape `(1, seq, vocab)`. Layer outputs are reported to
    /// the hook registry as a side channel.
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor>;
}

/// Tokenize with BOS and run one forward pass.
pub fn forward_text(model: &dyn TapBackend, text: &str) -> Result<Tensor> {
    let ids = model.encode(text, true)?;
    let input = Tensor::new(ids.as_slice(), model.device())?.unsqueeze(0)?;
    model.forward(&input)
}

/// Parse a `--device` argument: `cpu`, `cuda`, `cuda:<n>` or `metal`.
pub fn parse_device(device: &str) -> Result<Device> {
    match device {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(0)?),
        "metal" => Ok(Device::new_metal(0)?),
        other => {
            if let Some(ordinal) = other.strip_prefix("cuda:") {
                let ordinal: usize = ordinal
                    .parse()
                    .map_err(|_| anyhow::anyhow!("bad CUDA ordinal in '{other}'"))?;
                Ok(Device::new_cuda(ordinal)?)
            } else {
                bail!("unknown device '{other}' (expected cpu, cuda, cuda:<n> or metal)");
            }
        }
    }
}

/// Dtype policy: the 13B size runs in half precision off-CPU, everything
/// else in F32.
pub fn select_dtype(model_size: &str, device: &Device) -> DType {
    if model_size == "13B" && !device.is_cpu() {
        DType::F16
    } else {
        DType::F32
    }
}

/// Resolve `model_size` through the weights config and load the model.
pub fn load_model(
    config: &WeightsConfig,
    model_size: &str,
    device: &Device,
) -> Result<TapLlama> {
    let model_dir = config.model_dir(model_size)?;
    let dtype = select_dtype(model_size, device);

    info!("Model size: {}", model_size);
    info!("Device: {:?}", device);
    info!("Dtype: {:?}", dtype);

    load_model_from_dir(&model_dir, device, dtype)
}

/// Load a model from an explicit weights directory.
pub fn load_model_from_dir(model_dir: &Path, device: &Device, dtype: DType) -> Result<TapLlama> {
    TapLlama::load(model_dir, device, dtype)
}
