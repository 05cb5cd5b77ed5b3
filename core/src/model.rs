use anyhow::Result;
use burn::{
    module::{Module, Param},
    nn::Linear,
    tensor::{
        activation::{relu, sigmoid},
        backend::Backend,
        Tensor, TensorData,
    },
};
use rand::rngs::StdRng;

use crate::{
    config::HyperParameters,
    ffm::{BasicFfm, GaussianFfm},
    rng::{seeded_rng, uniform_samples},
};

/// Fourier feature mapping followed by a ReLU MLP with a sigmoid output layer.
///
/// Without a gaussian mapping the stateless [`BasicFfm`] is applied instead.
#[derive(Module, Debug)]
pub struct FourierMlp<B: Backend> {
    gaussian_ffm: Option<GaussianFfm<B>>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> FourierMlp<B> {
    pub fn init(
        params: &HyperParameters,
        input_dim: usize,
        device: &B::Device,
        seed: u64,
    ) -> Result<Self> {
        params.validate()?;
        let mut rng = seeded_rng(seed);

        let (gaussian_ffm, feature_dim) = if params.gaussian {
            let ffm = GaussianFfm::new(
                &mut rng,
                device,
                input_dim,
                params.num_units_ffm,
                params.std_dev,
            )?;
            let dim = ffm.output_dim();
            (Some(ffm), dim)
        } else {
            (None, BasicFfm.output_dim(input_dim))
        };

        let mut hidden = Vec::with_capacity(params.num_layers);
        let mut fan_in = feature_dim;
        for _ in 0..params.num_layers {
            hidden.push(glorot_linear::<B>(&mut rng, device, fan_in, params.num_units));
            fan_in = params.num_units;
        }
        let output = glorot_linear::<B>(&mut rng, device, fan_in, params.num_units_final);

        Ok(Self {
            gaussian_ffm,
            hidden,
            output,
        })
    }

    pub fn features(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.gaussian_ffm {
            Some(ffm) => ffm.forward(inputs),
            None => BasicFfm.forward(inputs),
        }
    }

    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.features(inputs);
        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }
        sigmoid(self.output.forward(x))
    }

    pub fn gaussian_ffm(&self) -> Option<&GaussianFfm<B>> {
        self.gaussian_ffm.as_ref()
    }

    pub fn output_dim(&self) -> usize {
        self.output.weight.dims()[1]
    }
}

fn glorot_linear<B: Backend>(
    rng: &mut StdRng,
    device: &B::Device,
    fan_in: usize,
    fan_out: usize,
) -> Linear<B> {
    let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
    let weight = Tensor::<B, 2>::from_floats(
        TensorData::new(
            uniform_samples(rng, fan_in * fan_out, limit),
            [fan_in, fan_out],
        ),
        device,
    );
    let bias = Tensor::<B, 1>::zeros([fan_out], device);

    Linear {
        weight: Param::from_tensor(weight),
        bias: Some(Param::from_tensor(bias)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_candle::{Candle, CandleDevice};

    type TestBackend = Candle<f32, i64>;

    fn small_params() -> HyperParameters {
        HyperParameters {
            num_layers: 2,
            num_units: 16,
            num_units_ffm: 8,
            ..HyperParameters::default()
        }
    }

    #[test]
    fn forward_produces_rgb_in_unit_range() {
        let device = CandleDevice::Cpu;
        let model = FourierMlp::<TestBackend>::init(&small_params(), 2, &device, 0).unwrap();
        let inputs = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        let output = model.forward(inputs);
        assert_eq!(output.dims(), [5, 3]);
        assert_eq!(model.output_dim(), 3);

        let values = output.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn basic_mapping_feeds_twice_the_input_dim() {
        let device = CandleDevice::Cpu;
        let params = HyperParameters {
            gaussian: false,
            ..small_params()
        };
        let model = FourierMlp::<TestBackend>::init(&params, 2, &device, 0).unwrap();
        assert!(model.gaussian_ffm().is_none());
        let features = model.features(Tensor::zeros([3, 2], &device));
        assert_eq!(features.dims(), [3, 4]);
    }

    #[test]
    fn same_seed_builds_identical_models() {
        let device = CandleDevice::Cpu;
        let params = small_params();
        let a = FourierMlp::<TestBackend>::init(&params, 2, &device, 42).unwrap();
        let b = FourierMlp::<TestBackend>::init(&params, 2, &device, 42).unwrap();
        let inputs = Tensor::<TestBackend, 2>::ones([4, 2], &device).mul_scalar(0.3);

        let out_a = a.forward(inputs.clone()).into_data().to_vec::<f32>().unwrap();
        let out_b = b.forward(inputs).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn init_rejects_invalid_params() {
        let device = CandleDevice::Cpu;
        let params = HyperParameters {
            num_units: 0,
            ..small_params()
        };
        assert!(FourierMlp::<TestBackend>::init(&params, 2, &device, 0).is_err());
    }
}
