//! Fourier feature mappings.
//!
//! Both mappings lift coordinates `x` of shape `[batch, d]` into
//! `[sin(2πv), cos(2πv)]`, where `v` is either `x` itself ([`BasicFfm`]) or a
//! fixed random projection `xB` ([`GaussianFfm`]).

use std::f32::consts::TAU;

use anyhow::{bail, Result};
use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor, TensorData},
};
use rand::rngs::StdRng;

use crate::rng::normal_samples;

/// Deterministic mapping with no state: `[sin(2πx), cos(2πx)]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicFfm;

impl BasicFfm {
    pub fn new() -> Self {
        Self
    }

    pub fn forward<B: Backend>(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        sin_cos(inputs)
    }

    pub fn output_dim(&self, input_dim: usize) -> usize {
        2 * input_dim
    }
}

/// Random Fourier features with a frozen projection matrix.
///
/// The projection is stored as a plain tensor rather than a `Param`, so it is
/// part of the module record but never visited by an optimizer.
#[derive(Module, Debug)]
pub struct GaussianFfm<B: Backend> {
    projection: Tensor<B, 2>,
}

impl<B: Backend> GaussianFfm<B> {
    /// Sample a `[input_dim, num_units]` projection with entries `N(0, 1) * std_dev`.
    pub fn new(
        rng: &mut StdRng,
        device: &B::Device,
        input_dim: usize,
        num_units: usize,
        std_dev: f32,
    ) -> Result<Self> {
        if input_dim == 0 || num_units == 0 {
            bail!(
                "gaussian FFM needs non-zero dimensions (input_dim {}, num_units {})",
                input_dim,
                num_units
            );
        }
        if !(std_dev.is_finite() && std_dev >= 0.0) {
            bail!("gaussian FFM std_dev must be finite and >= 0, got {}", std_dev);
        }

        let values = normal_samples(rng, input_dim * num_units, std_dev);
        let projection =
            Tensor::<B, 2>::from_floats(TensorData::new(values, [input_dim, num_units]), device);

        Ok(Self { projection })
    }

    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        sin_cos(inputs.matmul(self.projection.clone()))
    }

    pub fn projection(&self) -> Tensor<B, 2> {
        self.projection.clone()
    }

    pub fn input_dim(&self) -> usize {
        self.projection.dims()[0]
    }

    pub fn num_units(&self) -> usize {
        self.projection.dims()[1]
    }

    pub fn output_dim(&self) -> usize {
        2 * self.num_units()
    }
}

fn sin_cos<B: Backend>(values: Tensor<B, 2>) -> Tensor<B, 2> {
    let scaled = values.mul_scalar(TAU);
    Tensor::cat(vec![scaled.clone().sin(), scaled.cos()], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded_rng;
    use burn_candle::{Candle, CandleDevice};
    use rand::Rng;

    type TestBackend = Candle<f32, i64>;

    fn random_inputs(rows: usize, cols: usize, device: &CandleDevice) -> Tensor<TestBackend, 2> {
        let mut rng = seeded_rng(1);
        let values: Vec<f32> = (0..rows * cols).map(|_| rng.gen::<f32>()).collect();
        Tensor::from_floats(TensorData::new(values, [rows, cols]), device)
    }

    fn to_vec(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn basic_output_shape() {
        let device = CandleDevice::Cpu;
        let output = BasicFfm::new().forward(random_inputs(500, 2, &device));
        assert_eq!(output.dims(), [500, 4]);
        assert_eq!(BasicFfm.output_dim(2), 4);
    }

    #[test]
    fn gaussian_output_shape() {
        let device = CandleDevice::Cpu;
        let mut rng = seeded_rng(1);
        let ffm = GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 126, 2.3).unwrap();
        let output = ffm.forward(random_inputs(500, 2, &device));
        assert_eq!(output.dims(), [500, 252]);
        assert_eq!(ffm.output_dim(), 252);
        assert_eq!(ffm.input_dim(), 2);
    }

    #[test]
    fn basic_is_deterministic() {
        let device = CandleDevice::Cpu;
        let ffm = BasicFfm::new();
        let first = to_vec(ffm.forward(random_inputs(32, 2, &device)));
        let second = to_vec(ffm.forward(random_inputs(32, 2, &device)));
        assert_eq!(first, second);
    }

    #[test]
    fn basic_values_are_sin_then_cos() {
        let device = CandleDevice::Cpu;
        let inputs = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.25_f32, 0.0], [1, 2]),
            &device,
        );
        let output = to_vec(BasicFfm.forward(inputs));
        let expected = [1.0, 0.0, 0.0, 1.0];
        for (actual, expected) in output.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-5, "{actual} vs {expected}");
        }
    }

    #[test]
    fn gaussian_projection_is_fixed_between_calls() {
        let device = CandleDevice::Cpu;
        let mut rng = seeded_rng(9);
        let ffm = GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 16, 5.0).unwrap();
        let inputs = random_inputs(8, 2, &device);
        let first = to_vec(ffm.forward(inputs.clone()));
        let second = to_vec(ffm.forward(inputs));
        assert_eq!(first, second);
    }

    #[test]
    fn projection_entries_scale_with_std_dev() {
        let device = CandleDevice::Cpu;
        let mut rng = seeded_rng(3);
        let ffm = GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 5000, 7.0).unwrap();
        let values = to_vec(ffm.projection());
        assert_eq!(values.len(), 10_000);

        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
        assert!(mean.abs() < 0.3, "mean {mean}");
        assert!((std - 7.0).abs() < 0.3, "std {std}");
    }

    #[test]
    fn zero_std_dev_collapses_to_constant_features() {
        let device = CandleDevice::Cpu;
        let mut rng = seeded_rng(9);
        let ffm = GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 4, 0.0).unwrap();
        let output = to_vec(ffm.forward(random_inputs(3, 2, &device)));
        for row in output.chunks(8) {
            assert!(row[..4].iter().all(|v| v.abs() < 1e-6));
            assert!(row[4..].iter().all(|v| (v - 1.0).abs() < 1e-6));
        }
    }

    #[test]
    fn rejects_invalid_std_dev() {
        let device = CandleDevice::Cpu;
        let mut rng = seeded_rng(9);
        assert!(GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 4, -1.0).is_err());
        assert!(GaussianFfm::<TestBackend>::new(&mut rng, &device, 2, 4, f32::NAN).is_err());
        assert!(GaussianFfm::<TestBackend>::new(&mut rng, &device, 0, 4, 1.0).is_err());
    }
}
