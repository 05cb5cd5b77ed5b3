use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Metrics recorded at the end of every training epoch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub train_psnr: f32,
    pub test_psnr: f32,
}

/// Reconstruction quality of one image after training.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub train_psnr: f32,
    pub test_psnr: f32,
}

/// PSNR in dB for signals in `[0, max_value]`, given their mean squared error.
pub fn psnr_from_mse(mse: f32, max_value: f32) -> f32 {
    20.0 * max_value.log10() - 10.0 * mse.log10()
}

/// PSNR in dB between two equally sized buffers with values in `[0, max_value]`.
pub fn psnr(target: &[f32], prediction: &[f32], max_value: f32) -> Result<f32> {
    if target.len() != prediction.len() {
        bail!(
            "psnr inputs differ in length ({} vs {})",
            target.len(),
            prediction.len()
        );
    }
    if target.is_empty() {
        bail!("psnr needs at least one value");
    }

    let sum: f64 = target
        .iter()
        .zip(prediction)
        .map(|(&t, &p)| {
            let diff = f64::from(t) - f64::from(p);
            diff * diff
        })
        .sum();
    let mse = (sum / target.len() as f64) as f32;

    Ok(psnr_from_mse(mse, max_value))
}

pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}
