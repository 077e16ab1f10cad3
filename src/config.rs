//! Weights configuration
//!
//! A `config.json` next to the binary names the root directory holding
//! LLaMA weights and the subdirectory for each model size:
//!
//! ```json
//! {
//!     "weights_directory": "/data/llama",
//!     "models": { "7B": "llama-7b", "13B": "llama-13b" }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Resolves model-size identifiers to on-disk weight directories.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    /// Root directory containing one subdirectory per model size
    pub weights_directory: PathBuf,
    /// Size identifier -> subdirectory name under `weights_directory`
    pub models: HashMap<String, String>,
}

impl WeightsConfig {
    /// Load and validate the config file.
    ///
    /// A missing weights root is a startup error: nothing else in the
    /// pipeline can run without it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: WeightsConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if !config.weights_directory.exists() {
            bail!(
                "weights directory {} does not exist; set weights_directory in {}",
                config.weights_directory.display(),
                path.display()
            );
        }

        Ok(config)
    }

    /// Directory holding the weights for `model_size`.
    pub fn model_dir(&self, model_size: &str) -> Result<PathBuf> {
        let subdir = self.models.get(model_size).with_context(|| {
            format!(
                "unknown model size '{model_size}'; configured sizes: {:?}",
                self.models.keys().collect::<Vec<_>>()
            )
        })?;
        Ok(self.weights_directory.join(subdir))
    }
}
