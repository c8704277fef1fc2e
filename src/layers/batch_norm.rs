use serde::{Serialize, Deserialize};

use crate::layers::param::Param;
use crate::math::tensor::Tensor;

/// Per-channel batch normalization over `(batch, channels, height, width)`.
///
/// Training normalizes with the statistics of the current mini-batch and
/// folds them into exponential running averages; inference uses the
/// running averages only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm2d {
    pub channels: usize,
    pub momentum: f32,
    pub epsilon: f32,
    pub gamma: Param,
    pub beta: Param,
    pub running_mean: Vec<f32>,
    pub running_var: Vec<f32>,
    #[serde(skip)]
    cache: Option<BatchNormCache>,
}

#[derive(Debug, Clone)]
struct BatchNormCache {
    x_hat: Tensor,
    inv_std: Vec<f32>,
}

impl BatchNorm2d {
    pub const DEFAULT_MOMENTUM: f32 = 0.99;
    pub const DEFAULT_EPSILON: f32 = 1e-3;

    pub fn new(channels: usize) -> BatchNorm2d {
        BatchNorm2d {
            channels,
            momentum: Self::DEFAULT_MOMENTUM,
            epsilon: Self::DEFAULT_EPSILON,
            gamma: Param::new(Tensor::filled(&[channels], 1.0)),
            beta: Param::new(Tensor::zeros(&[channels])),
            running_mean: vec![0.0; channels],
            running_var: vec![1.0; channels],
            cache: None,
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        if input.len() != 4 || input[1] != self.channels {
            return Err(format!(
                "batch norm expects (batch, {}, h, w), got {:?}", self.channels, input
            ));
        }
        if self.gamma.value.len() != self.channels
            || self.beta.value.len() != self.channels
            || self.running_mean.len() != self.channels
            || self.running_var.len() != self.channels
        {
            return Err(format!("batch norm statistics do not match {} channels", self.channels));
        }
        Ok(input.to_vec())
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let plane = plane_size(input);
        let mut out = input.clone();
        for (i, chunk) in out.data.chunks_mut(plane).enumerate() {
            let c = i % self.channels;
            let inv_std = 1.0 / (self.running_var[c] + self.epsilon).sqrt();
            let (gamma, beta, mean) = (self.gamma.value.data[c], self.beta.value.data[c], self.running_mean[c]);
            for v in chunk.iter_mut() {
                *v = gamma * (*v - mean) * inv_std + beta;
            }
        }
        out
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let plane = plane_size(input);
        let batch = input.shape[0];
        let count = (batch * plane) as f32;

        let mut mean = vec![0.0f32; self.channels];
        let mut var = vec![0.0f32; self.channels];
        for (i, chunk) in input.data.chunks(plane).enumerate() {
            mean[i % self.channels] += chunk.iter().sum::<f32>();
        }
        mean.iter_mut().for_each(|m| *m /= count);
        for (i, chunk) in input.data.chunks(plane).enumerate() {
            let c = i % self.channels;
            var[c] += chunk.iter().map(|v| (v - mean[c]).powi(2)).sum::<f32>();
        }
        var.iter_mut().for_each(|v| *v /= count);

        let inv_std: Vec<f32> = var.iter().map(|v| 1.0 / (v + self.epsilon).sqrt()).collect();
        let mut x_hat = input.clone();
        let mut out = input.clone();
        for (i, (xh, o)) in x_hat.data.chunks_mut(plane).zip(out.data.chunks_mut(plane)).enumerate() {
            let c = i % self.channels;
            let (gamma, beta) = (self.gamma.value.data[c], self.beta.value.data[c]);
            for (h, y) in xh.iter_mut().zip(o.iter_mut()) {
                *h = (*h - mean[c]) * inv_std[c];
                *y = gamma * *h + beta;
            }
        }

        // The moving variance takes the unbiased estimate, as Keras does.
        let bessel = if count > 1.0 { count / (count - 1.0) } else { 1.0 };
        for c in 0..self.channels {
            self.running_mean[c] = self.momentum * self.running_mean[c] + (1.0 - self.momentum) * mean[c];
            self.running_var[c] = self.momentum * self.running_var[c] + (1.0 - self.momentum) * var[c] * bessel;
        }

        self.cache = Some(BatchNormCache { x_hat, inv_std });
        out
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let cache = self.cache.take()
            .expect("BatchNorm2d::backward called without a preceding forward_train");
        let plane = plane_size(grad_output);
        let count = (grad_output.shape[0] * plane) as f32;

        let mut d_gamma = vec![0.0f32; self.channels];
        let mut d_beta = vec![0.0f32; self.channels];
        for (i, (dy, xh)) in grad_output.data.chunks(plane).zip(cache.x_hat.data.chunks(plane)).enumerate() {
            let c = i % self.channels;
            d_beta[c] += dy.iter().sum::<f32>();
            d_gamma[c] += dy.iter().zip(xh).map(|(d, h)| d * h).sum::<f32>();
        }

        // dx = γ·inv_std/m · (m·dy − Σdy − x̂·Σ(dy·x̂))
        let mut grad_input = grad_output.clone();
        for (i, (dx, xh)) in grad_input.data.chunks_mut(plane).zip(cache.x_hat.data.chunks(plane)).enumerate() {
            let c = i % self.channels;
            let scale = self.gamma.value.data[c] * cache.inv_std[c] / count;
            for (d, h) in dx.iter_mut().zip(xh) {
                *d = scale * (count * *d - d_beta[c] - h * d_gamma[c]);
            }
        }

        for (acc, v) in self.gamma.grad_mut().iter_mut().zip(d_gamma) {
            *acc += v;
        }
        for (acc, v) in self.beta.grad_mut().iter_mut().zip(d_beta) {
            *acc += v;
        }
        grad_input
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.gamma, &mut self.beta]
    }
}

fn plane_size(t: &Tensor) -> usize {
    t.shape[2] * t.shape[3]
}
