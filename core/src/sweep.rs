//! Bandwidth sweep over the standard deviation of the gaussian mapping.

use std::ops::RangeInclusive;

use anyhow::{bail, Context, Result};
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::HyperParameters,
    data::{ImageRegressionDataset, COORD_DIM},
    metrics::mean,
    model::FourierMlp,
    rng::derive_seed,
    train::{test_model, train_model},
    tracking::{TaggedTracker, Tracker},
};

/// One train-and-evaluate run for a candidate standard deviation on one image.
///
/// Returns the test PSNR of the trained model.
pub trait BandwidthTrial {
    fn run(&mut self, std_dev: u32, image_index: usize) -> Result<f32>;
}

impl<F> BandwidthTrial for F
where
    F: FnMut(u32, usize) -> Result<f32>,
{
    fn run(&mut self, std_dev: u32, image_index: usize) -> Result<f32> {
        self(std_dev, image_index)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateScores {
    pub std_dev: u32,
    pub image_scores: Vec<f32>,
    pub mean_score: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepResult {
    pub candidates: Vec<CandidateScores>,
    pub best_std_dev: u32,
}

impl SweepResult {
    pub fn best(&self) -> Option<&CandidateScores> {
        self.candidates
            .iter()
            .find(|candidate| candidate.std_dev == self.best_std_dev)
    }
}

/// Score every standard deviation in `std_devs` on the first `images` images.
///
/// Candidates are visited in order and the one with the highest mean test PSNR
/// wins; the earliest candidate is kept on ties. Any trial error aborts the sweep.
pub fn find_best_std_dev<T: BandwidthTrial + ?Sized>(
    std_devs: RangeInclusive<u32>,
    images: usize,
    trial: &mut T,
) -> Result<SweepResult> {
    if std_devs.is_empty() {
        bail!(
            "empty std_dev range {}..={}",
            std_devs.start(),
            std_devs.end()
        );
    }
    if images == 0 {
        bail!("bandwidth sweep needs at least one image");
    }

    let mut candidates = Vec::new();
    for std_dev in std_devs {
        let mut image_scores = Vec::with_capacity(images);
        for image_index in 0..images {
            let score = trial
                .run(std_dev, image_index)
                .with_context(|| format!("trial std_dev {} image {} failed", std_dev, image_index))?;
            info!(std_dev, image_index, test_psnr = score, "trial finished");
            image_scores.push(score);
        }

        let mean_score = mean(&image_scores).unwrap_or(f32::NAN);
        info!(std_dev, mean_psnr = mean_score, "average PSNR for std_dev");
        candidates.push(CandidateScores {
            std_dev,
            image_scores,
            mean_score,
        });
    }

    let best_std_dev = select_best(&candidates);
    info!(best_std_dev, "bandwidth sweep finished");

    Ok(SweepResult {
        candidates,
        best_std_dev,
    })
}

fn select_best(candidates: &[CandidateScores]) -> u32 {
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        let replaces_nan = best.mean_score.is_nan() && !candidate.mean_score.is_nan();
        if candidate.mean_score > best.mean_score || replaces_nan {
            best = candidate;
        }
    }
    best.std_dev
}

/// Trains a fresh gaussian Fourier MLP per trial on the shared dataset.
pub struct TrainingTrial<'a, B: AutodiffBackend> {
    pub dataset: &'a ImageRegressionDataset,
    pub params: HyperParameters,
    pub device: B::Device,
    pub tracker: &'a mut dyn Tracker,
}

impl<B: AutodiffBackend> TrainingTrial<'_, B> {
    /// Settings for one trial: the candidate std_dev and a seed of its own.
    ///
    /// The seed drives both weight initialization and mini-batch shuffling.
    pub fn trial_params(&self, std_dev: u32, image_index: usize) -> HyperParameters {
        let mut params = self.params.clone().with_gaussian(std_dev as f32);
        params.seed = derive_seed(self.params.seed, &[u64::from(std_dev), image_index as u64]);
        params
    }

    pub fn build_model(&self, params: &HyperParameters) -> Result<FourierMlp<B>> {
        FourierMlp::<B>::init(params, COORD_DIM, &self.device, params.seed)
    }
}

impl<B: AutodiffBackend> BandwidthTrial for TrainingTrial<'_, B> {
    fn run(&mut self, std_dev: u32, image_index: usize) -> Result<f32> {
        let image = self.dataset.get(image_index)?;
        let params = self.trial_params(std_dev, image_index);
        let model = self.build_model(&params)?;

        let mut tracker = TaggedTracker::new(
            &mut *self.tracker,
            vec![
                ("std_dev", f64::from(std_dev)),
                ("image_index", image_index as f64),
            ],
        );
        let outcome = train_model(model, image, &params, &self.device, &mut tracker)?;
        let evaluation = test_model(
            &outcome.model.valid(),
            image,
            params.batch_size,
            &self.device,
            &mut tracker,
        )?;

        Ok(evaluation.metrics.test_psnr)
    }
}
