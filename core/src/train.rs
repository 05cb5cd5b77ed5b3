use anyhow::{anyhow, bail, Result};
use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor, TensorData,
    },
};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::{
    config::HyperParameters,
    data::{ImageSplit, RegressionImage, CHANNELS, COORD_DIM},
    metrics::{psnr, psnr_from_mse, EpochMetrics, EvaluationMetrics},
    model::FourierMlp,
    rng::seeded_rng,
    tracking::Tracker,
};

pub const TRAIN_PSNR_KEY: &str = "Train PSNR Value";
pub const TEST_PSNR_KEY: &str = "Test PSNR Value";

pub struct TrainOutcome<B: AutodiffBackend> {
    pub model: FourierMlp<B>,
    pub history: Vec<EpochMetrics>,
}

/// Predictions for both splits of one image together with their PSNR.
#[derive(Clone, Debug)]
pub struct ImageEvaluation {
    pub metrics: EvaluationMetrics,
    pub train_prediction: Vec<f32>,
    pub test_prediction: Vec<f32>,
}

/// Fit `model` to the train split of `image` with Adam on mean squared error.
///
/// The test split is evaluated after every epoch and reported as validation PSNR.
pub fn train_model<B: AutodiffBackend>(
    mut model: FourierMlp<B>,
    image: &RegressionImage,
    params: &HyperParameters,
    device: &B::Device,
    tracker: &mut dyn Tracker,
) -> Result<TrainOutcome<B>> {
    params.validate()?;
    let train = &image.train;
    if train.is_empty() {
        bail!("image {} has an empty train split", image.name);
    }
    if model.output_dim() != CHANNELS {
        bail!(
            "model output_dim {} does not match {} image channels",
            model.output_dim(),
            CHANNELS
        );
    }

    let mut optimizer = AdamConfig::new()
        .with_beta_1(params.beta_1)
        .with_beta_2(params.beta_2)
        .with_epsilon(params.epsilon)
        .init();
    let loss_fn = MseLoss::new();
    let mut rng = seeded_rng(params.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();
    let mut history = Vec::with_capacity(params.epochs);
    let log_every = (params.epochs / 10).max(1);

    for epoch in 1..=params.epochs {
        order.shuffle(&mut rng);
        let mut squared_error = 0.0f64;

        for batch_indices in order.chunks(params.batch_size) {
            let (inputs, targets) = gather_batch::<B>(train, batch_indices, device);
            let predictions = model.forward(inputs);
            let loss = loss_fn.forward(predictions, targets, Reduction::Mean);
            let loss_scalar = loss.clone().into_scalar().elem::<f32>();
            squared_error += f64::from(loss_scalar) * batch_indices.len() as f64;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(params.learning_rate, model, grads);
        }

        let epoch_loss = (squared_error / train.len() as f64) as f32;
        let test_prediction = predict(&model.valid(), &image.test, params.batch_size, device)?;
        let metrics = EpochMetrics {
            epoch,
            loss: epoch_loss,
            train_psnr: psnr_from_mse(epoch_loss, 1.0),
            test_psnr: psnr(image.test.pixels(), &test_prediction, 1.0)?,
        };

        if epoch % log_every == 0 || epoch == params.epochs {
            info!(
                image = %image.name,
                epoch,
                loss = metrics.loss,
                train_psnr = metrics.train_psnr,
                test_psnr = metrics.test_psnr,
                "epoch finished"
            );
        } else {
            debug!(image = %image.name, epoch, loss = metrics.loss, "epoch finished");
        }
        tracker.log(
            epoch,
            &[
                ("loss", f64::from(metrics.loss)),
                ("psnr", f64::from(metrics.train_psnr)),
                ("val_psnr", f64::from(metrics.test_psnr)),
            ],
        )?;

        history.push(metrics);
    }

    Ok(TrainOutcome { model, history })
}

/// Run the model over every coordinate of `split` in chunks of `chunk_size`.
///
/// Returns a flat `[len, output_dim]` buffer.
pub fn predict<B: Backend>(
    model: &FourierMlp<B>,
    split: &ImageSplit,
    chunk_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    if chunk_size == 0 {
        bail!("prediction chunk size must be > 0");
    }

    let mut output = Vec::with_capacity(split.len() * model.output_dim());
    for chunk in split.coords().chunks(chunk_size * COORD_DIM) {
        let rows = chunk.len() / COORD_DIM;
        let inputs = Tensor::<B, 2>::from_floats(TensorData::new(chunk.to_vec(), [rows, COORD_DIM]), device);
        let values = model
            .forward(inputs)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| anyhow!("failed to decode predictions: {err:?}"))?;
        output.extend_from_slice(&values);
    }

    Ok(output)
}

/// Evaluate train and test PSNR for one image and log them to `tracker`.
pub fn test_model<B: Backend>(
    model: &FourierMlp<B>,
    image: &RegressionImage,
    chunk_size: usize,
    device: &B::Device,
    tracker: &mut dyn Tracker,
) -> Result<ImageEvaluation> {
    let train_prediction = predict(model, &image.train, chunk_size, device)?;
    let test_prediction = predict(model, &image.test, chunk_size, device)?;

    let metrics = EvaluationMetrics {
        train_psnr: psnr(image.train.pixels(), &train_prediction, 1.0)?,
        test_psnr: psnr(image.test.pixels(), &test_prediction, 1.0)?,
    };

    info!(
        image = %image.name,
        train_psnr = metrics.train_psnr,
        test_psnr = metrics.test_psnr,
        "evaluated model"
    );
    tracker.log(
        0,
        &[
            (TRAIN_PSNR_KEY, f64::from(metrics.train_psnr)),
            (TEST_PSNR_KEY, f64::from(metrics.test_psnr)),
        ],
    )?;

    Ok(ImageEvaluation {
        metrics,
        train_prediction,
        test_prediction,
    })
}

fn gather_batch<B: Backend>(
    split: &ImageSplit,
    indices: &[usize],
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let mut coords = Vec::with_capacity(indices.len() * COORD_DIM);
    let mut pixels = Vec::with_capacity(indices.len() * CHANNELS);
    for &idx in indices {
        coords.extend_from_slice(split.coord(idx));
        pixels.extend_from_slice(split.pixel(idx));
    }

    let inputs =
        Tensor::<B, 2>::from_floats(TensorData::new(coords, [indices.len(), COORD_DIM]), device);
    let targets =
        Tensor::<B, 2>::from_floats(TensorData::new(pixels, [indices.len(), CHANNELS]), device);

    (inputs, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::ImageRegressionDataset, tracking::NullTracker};
    use burn_autodiff::Autodiff;
    use burn_candle::{Candle, CandleDevice};

    type TestBackend = Autodiff<Candle<f32, i64>>;

    fn small_params() -> HyperParameters {
        HyperParameters {
            num_layers: 2,
            num_units: 32,
            num_units_ffm: 16,
            std_dev: 2.0,
            epochs: 30,
            batch_size: 64,
            learning_rate: 1e-2,
            ..HyperParameters::default()
        }
    }

    #[test]
    fn training_reduces_loss_on_synthetic_image() {
        let device = CandleDevice::Cpu;
        let dataset = ImageRegressionDataset::synthetic(1, 16, 5).unwrap();
        let image = dataset.get(0).unwrap();
        let params = small_params();
        let model = FourierMlp::<TestBackend>::init(&params, COORD_DIM, &device, 1).unwrap();

        let outcome = train_model(model, image, &params, &device, &mut NullTracker).unwrap();
        assert_eq!(outcome.history.len(), params.epochs);

        let first = outcome.history.first().unwrap();
        let last = outcome.history.last().unwrap();
        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
        assert!(last.train_psnr > first.train_psnr);
    }

    #[test]
    fn optimizer_leaves_gaussian_projection_untouched() {
        let device = CandleDevice::Cpu;
        let dataset = ImageRegressionDataset::synthetic(1, 8, 2).unwrap();
        let image = dataset.get(0).unwrap();
        let params = HyperParameters {
            epochs: 3,
            ..small_params()
        };
        let model = FourierMlp::<TestBackend>::init(&params, COORD_DIM, &device, 1).unwrap();
        let before = model
            .gaussian_ffm()
            .unwrap()
            .projection()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        let outcome = train_model(model, image, &params, &device, &mut NullTracker).unwrap();
        let after = outcome
            .model
            .gaussian_ffm()
            .unwrap()
            .projection()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_model_reports_both_splits() {
        let device = CandleDevice::Cpu;
        let dataset = ImageRegressionDataset::synthetic(1, 8, 2).unwrap();
        let image = dataset.get(0).unwrap();
        let params = small_params();
        let model = FourierMlp::<TestBackend>::init(&params, COORD_DIM, &device, 1).unwrap();

        let evaluation = test_model(&model.valid(), image, 10, &device, &mut NullTracker).unwrap();
        assert_eq!(evaluation.train_prediction.len(), 16 * CHANNELS);
        assert_eq!(evaluation.test_prediction.len(), 64 * CHANNELS);
        assert!(evaluation.metrics.test_psnr.is_finite());
        assert!(evaluation.metrics.train_psnr.is_finite());
    }

    #[test]
    fn batch_order_follows_params_seed() {
        let device = CandleDevice::Cpu;
        let dataset = ImageRegressionDataset::synthetic(1, 8, 2).unwrap();
        let image = dataset.get(0).unwrap();
        let losses = |seed: u64| {
            let params = HyperParameters {
                epochs: 2,
                batch_size: 4,
                seed,
                ..small_params()
            };
            let model = FourierMlp::<TestBackend>::init(&params, COORD_DIM, &device, 1).unwrap();
            train_model(model, image, &params, &device, &mut NullTracker)
                .unwrap()
                .history
                .iter()
                .map(|metrics| metrics.loss)
                .collect::<Vec<_>>()
        };

        assert_eq!(losses(7), losses(7));
        assert_ne!(losses(7), losses(8));
    }
}
