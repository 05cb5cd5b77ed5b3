use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Load a JSON configuration from disk, creating it with the provided initializer if missing.
pub fn load_or_init<T, F>(path: &Path, initializer: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(value)
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let value = initializer();
        let serialized = serde_json::to_string_pretty(&value)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(value)
    }
}

/// Model and optimizer settings for one Fourier MLP run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParameters {
    pub num_layers: usize,
    pub num_units: usize,
    pub num_units_final: usize,
    pub gaussian: bool,
    pub std_dev: f32,
    pub num_units_ffm: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            num_layers: 10,
            num_units: 128,
            num_units_final: 3,
            gaussian: true,
            std_dev: 5.0,
            num_units_ffm: 128,
            learning_rate: 1e-3,
            epochs: 100,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            batch_size: 2048,
            seed: 1337,
        }
    }
}

impl HyperParameters {
    pub fn with_gaussian(mut self, std_dev: f32) -> Self {
        self.gaussian = true;
        self.std_dev = std_dev;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_units == 0 || self.num_units_final == 0 {
            bail!(
                "layer sizes must be > 0 (num_units {}, num_units_final {})",
                self.num_units,
                self.num_units_final
            );
        }
        if self.gaussian && self.num_units_ffm == 0 {
            bail!("num_units_ffm must be > 0 for the gaussian mapping");
        }
        if !(self.std_dev.is_finite() && self.std_dev >= 0.0) {
            bail!("std_dev must be finite and >= 0, got {}", self.std_dev);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be finite and > 0, got {}", self.learning_rate);
        }
        for (name, beta) in [("beta_1", self.beta_1), ("beta_2", self.beta_2)] {
            if !(0.0..1.0).contains(&beta) {
                bail!("{} must be in [0, 1), got {}", name, beta);
            }
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            bail!("epsilon must be finite and > 0, got {}", self.epsilon);
        }
        if self.epochs == 0 {
            bail!("epochs must be > 0");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be > 0");
        }
        Ok(())
    }
}
