use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::layers::param::Param;
use crate::math::tensor::Tensor;

/// Border handling for a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Zero-pad by `kernel_size / 2` so the spatial size is preserved.
    Same,
    /// No padding; the output shrinks by `kernel_size - 1`.
    Valid,
}

/// 2-D convolution with stride 1 over `(batch, channels, height, width)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: Padding,
    /// Shape `(out_channels, in_channels, kernel_size, kernel_size)`.
    pub weights: Param,
    /// Shape `(out_channels)`.
    pub biases: Param,
    pub activator: ActivationFunction,
    #[serde(skip)]
    cache: Option<ConvCache>,
}

#[derive(Debug, Clone)]
struct ConvCache {
    input: Tensor,
    pre_activation: Tensor,
}

/// Precomputed sizes for one forward/backward call.
struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
    pad: isize,
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: Padding,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = in_channels * kernel_size * kernel_size;
        let shape = [out_channels, in_channels, kernel_size, kernel_size];
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&shape, fan_in, rng),
            _ => Tensor::xavier(&shape, fan_in, rng),
        };
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            weights: Param::new(weights),
            biases: Param::new(Tensor::zeros(&[out_channels])),
            activator: activation,
            cache: None,
        }
    }

    fn pad(&self) -> usize {
        match self.padding {
            Padding::Same => self.kernel_size / 2,
            Padding::Valid => 0,
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        if input.len() != 4 || input[1] != self.in_channels {
            return Err(format!(
                "conv2d expects (batch, {}, h, w), got {:?}", self.in_channels, input
            ));
        }
        let k = self.kernel_size;
        if self.weights.value.shape != [self.out_channels, self.in_channels, k, k]
            || self.biases.value.len() != self.out_channels
        {
            return Err(format!(
                "conv2d parameters do not match {}->{} with {}x{} kernel",
                self.in_channels, self.out_channels, k, k
            ));
        }
        let pad = self.pad();
        let (h, w) = (input[2] + 2 * pad, input[3] + 2 * pad);
        if h < k || w < k {
            return Err(format!(
                "conv2d input {}x{} is smaller than its {}x{} kernel", input[2], input[3], k, k
            ));
        }
        Ok(vec![input[0], self.out_channels, h - k + 1, w - k + 1])
    }

    fn geometry(&self, input: &Tensor) -> Geometry {
        let out = self.output_shape(&input.shape)
            .unwrap_or_else(|e| panic!("{}", e));
        Geometry {
            batch: input.shape[0],
            in_h: input.shape[2],
            in_w: input.shape[3],
            out_h: out[2],
            out_w: out[3],
            pad: self.pad() as isize,
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let z = self.convolve(input);
        z.map(|x| self.activator.function(x))
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let z = self.convolve(input);
        let a = z.map(|x| self.activator.function(x));
        self.cache = Some(ConvCache { input: input.clone(), pre_activation: z });
        a
    }

    fn convolve(&self, input: &Tensor) -> Tensor {
        let g = self.geometry(input);
        let (c_in, c_out, k) = (self.in_channels, self.out_channels, self.kernel_size);
        let w = &self.weights.value.data;
        let x = &input.data;

        let mut out = Tensor::zeros(&[g.batch, c_out, g.out_h, g.out_w]);
        let mut idx = 0;
        for b in 0..g.batch {
            for oc in 0..c_out {
                let bias = self.biases.value.data[oc];
                for oy in 0..g.out_h {
                    for ox in 0..g.out_w {
                        let mut sum = bias;
                        for ic in 0..c_in {
                            let x_plane = (b * c_in + ic) * g.in_h * g.in_w;
                            let w_plane = (oc * c_in + ic) * k * k;
                            for ky in 0..k {
                                let iy = oy as isize + ky as isize - g.pad;
                                if iy < 0 || iy >= g.in_h as isize {
                                    continue;
                                }
                                let x_row = x_plane + iy as usize * g.in_w;
                                for kx in 0..k {
                                    let ix = ox as isize + kx as isize - g.pad;
                                    if ix < 0 || ix >= g.in_w as isize {
                                        continue;
                                    }
                                    sum += w[w_plane + ky * k + kx] * x[x_row + ix as usize];
                                }
                            }
                        }
                        out.data[idx] = sum;
                        idx += 1;
                    }
                }
            }
        }
        out
    }

    /// Accumulates kernel and bias gradients and returns ∂L/∂input.
    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let cache = self.cache.take()
            .expect("Conv2d::backward called without a preceding forward_train");
        let g = self.geometry(&cache.input);
        let (c_in, c_out, k) = (self.in_channels, self.out_channels, self.kernel_size);

        let act_derivative = cache.pre_activation.map(|x| self.activator.derivative(x));
        let delta = grad_output.hadamard(&act_derivative);

        let x = &cache.input.data;
        let w = self.weights.value.data.clone();
        let mut grad_input = Tensor::zeros(&cache.input.shape);
        let mut weights_grad = vec![0.0f32; w.len()];
        let mut biases_grad = vec![0.0f32; c_out];

        let mut idx = 0;
        for b in 0..g.batch {
            for oc in 0..c_out {
                for oy in 0..g.out_h {
                    for ox in 0..g.out_w {
                        let d = delta.data[idx];
                        idx += 1;
                        if d == 0.0 {
                            continue;
                        }
                        biases_grad[oc] += d;
                        for ic in 0..c_in {
                            let x_plane = (b * c_in + ic) * g.in_h * g.in_w;
                            let w_plane = (oc * c_in + ic) * k * k;
                            for ky in 0..k {
                                let iy = oy as isize + ky as isize - g.pad;
                                if iy < 0 || iy >= g.in_h as isize {
                                    continue;
                                }
                                let x_row = x_plane + iy as usize * g.in_w;
                                for kx in 0..k {
                                    let ix = ox as isize + kx as isize - g.pad;
                                    if ix < 0 || ix >= g.in_w as isize {
                                        continue;
                                    }
                                    let xi = x_row + ix as usize;
                                    let wi = w_plane + ky * k + kx;
                                    weights_grad[wi] += d * x[xi];
                                    grad_input.data[xi] += d * w[wi];
                                }
                            }
                        }
                    }
                }
            }
        }

        for (acc, v) in self.weights.grad_mut().iter_mut().zip(weights_grad) {
            *acc += v;
        }
        for (acc, v) in self.biases.grad_mut().iter_mut().zip(biases_grad) {
            *acc += v;
        }
        grad_input
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights, &mut self.biases]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn layer(padding: Padding, c_in: usize, c_out: usize) -> Conv2d {
        Conv2d::new(c_in, c_out, 3, padding, ActivationFunction::Identity, &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn same_padding_preserves_spatial_size() {
        let conv = layer(Padding::Same, 1, 4);
        assert_eq!(conv.output_shape(&[2, 1, 28, 28]).unwrap(), vec![2, 4, 28, 28]);
        let y = conv.forward(&Tensor::zeros(&[2, 1, 28, 28]));
        assert_eq!(y.shape, vec![2, 4, 28, 28]);
    }

    #[test]
    fn valid_padding_shrinks_by_kernel_minus_one() {
        let conv = layer(Padding::Valid, 2, 3);
        assert_eq!(conv.output_shape(&[1, 2, 13, 13]).unwrap(), vec![1, 3, 11, 11]);
        assert!(conv.output_shape(&[1, 3, 13, 13]).is_err());
        assert!(conv.output_shape(&[1, 2, 2, 2]).is_err());
    }

    #[test]
    fn single_kernel_matches_hand_computed_valid_convolution() {
        let mut conv = layer(Padding::Valid, 1, 1);
        conv.weights.value = Tensor::from_vec(&[1, 1, 3, 3], vec![
            0.0, 1.0, 0.0,
            1.0, -4.0, 1.0,
            0.0, 1.0, 0.0,
        ]);
        conv.biases.value = Tensor::from_vec(&[1], vec![0.5]);
        let x = Tensor::from_vec(&[1, 1, 3, 4], vec![
            1.0, 2.0, 3.0, 4.0,
            5.0, 6.0, 7.0, 8.0,
            9.0, 10.0, 11.0, 12.0,
        ]);
        let y = conv.forward(&x);
        assert_eq!(y.shape, vec![1, 1, 1, 2]);
        // Laplacian of an affine ramp is zero; only the bias remains.
        assert!((y.data[0] - 0.5).abs() < 1e-6);
        assert!((y.data[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn backward_matches_numerical_gradient() {
        let x = Tensor::from_vec(&[1, 2, 4, 4], (0..32).map(|i| ((i * 7 % 11) as f32 - 5.0) / 5.0).collect());
        let mut conv = layer(Padding::Same, 2, 2);
        let out_len = 2 * 4 * 4;
        let coeffs = Tensor::from_vec(&[1, 2, 4, 4], (0..out_len).map(|i| ((i * 5 % 9) as f32 - 4.0) / 4.0).collect());
        let loss = |c: &Conv2d| -> f32 {
            c.forward(&x).data.iter().zip(coeffs.data.iter()).map(|(a, b)| a * b).sum()
        };

        conv.forward_train(&x);
        let grad_x = conv.backward(&coeffs);

        let eps = 1e-2;
        for i in 0..conv.weights.value.len() {
            let mut plus = conv.clone();
            plus.weights.value.data[i] += eps;
            let mut minus = conv.clone();
            minus.weights.value.data[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - conv.weights.grad.data[i]).abs() < 2e-3, "weight {}", i);
        }

        let loss_x = |input: &Tensor| -> f32 {
            conv.forward(input).data.iter().zip(coeffs.data.iter()).map(|(a, b)| a * b).sum()
        };
        for i in 0..x.len() {
            let mut plus = x.clone();
            plus.data[i] += eps;
            let mut minus = x.clone();
            minus.data[i] -= eps;
            let numeric = (loss_x(&plus) - loss_x(&minus)) / (2.0 * eps);
            assert!((numeric - grad_x.data[i]).abs() < 2e-3, "input {}", i);
        }
    }
}
