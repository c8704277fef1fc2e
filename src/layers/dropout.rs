use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Inverted dropout: during training each activation is zeroed with
/// probability `rate` and survivors are scaled by `1 / (1 - rate)`, so
/// inference is a plain pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
    #[serde(skip)]
    mask: Option<Vec<f32>>,
}

impl Dropout {
    pub fn new(rate: f32) -> Dropout {
        assert!((0.0..1.0).contains(&rate), "dropout rate must be in [0, 1)");
        Dropout { rate, mask: None }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        input.clone()
    }

    pub fn forward_train<R: Rng + ?Sized>(&mut self, input: &Tensor, rng: &mut R) -> Tensor {
        let keep = 1.0 - self.rate;
        let mask: Vec<f32> = (0..input.len())
            .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect();
        let out = Tensor {
            shape: input.shape.clone(),
            data: input.data.iter().zip(mask.iter()).map(|(x, m)| x * m).collect(),
        };
        self.mask = Some(mask);
        out
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let mask = self.mask.take()
            .expect("Dropout::backward called without a preceding forward_train");
        Tensor {
            shape: grad_output.shape.clone(),
            data: grad_output.data.iter().zip(mask.iter()).map(|(g, m)| g * m).collect(),
        }
    }
}
