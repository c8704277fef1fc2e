use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Non-overlapping max pooling (window = stride = `size`). Trailing rows and
/// columns that do not fill a whole window are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub size: usize,
    #[serde(skip)]
    cache: Option<PoolCache>,
}

#[derive(Debug, Clone)]
struct PoolCache {
    input_shape: Vec<usize>,
    /// Flat input index of the winning element for every output element.
    winners: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(size: usize) -> MaxPool2d {
        MaxPool2d { size, cache: None }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        if input.len() != 4 {
            return Err(format!("max pool expects (batch, c, h, w), got {:?}", input));
        }
        if self.size == 0 || input[2] < self.size || input[3] < self.size {
            return Err(format!(
                "max pool window {} does not fit a {}x{} input", self.size, input[2], input[3]
            ));
        }
        Ok(vec![input[0], input[1], input[2] / self.size, input[3] / self.size])
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        self.pool(input).0
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let (out, winners) = self.pool(input);
        self.cache = Some(PoolCache { input_shape: input.shape.clone(), winners });
        out
    }

    fn pool(&self, input: &Tensor) -> (Tensor, Vec<usize>) {
        let out_shape = self.output_shape(&input.shape)
            .unwrap_or_else(|e| panic!("{}", e));
        let (in_h, in_w) = (input.shape[2], input.shape[3]);
        let (out_h, out_w) = (out_shape[2], out_shape[3]);
        let planes = input.shape[0] * input.shape[1];

        let mut out = Tensor::zeros(&out_shape);
        let mut winners = Vec::with_capacity(out.len());
        for p in 0..planes {
            let base = p * in_h * in_w;
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best_idx = base + oy * self.size * in_w + ox * self.size;
                    let mut best = input.data[best_idx];
                    for dy in 0..self.size {
                        for dx in 0..self.size {
                            let idx = base + (oy * self.size + dy) * in_w + ox * self.size + dx;
                            if input.data[idx] > best {
                                best = input.data[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    out.data[(p * out_h + oy) * out_w + ox] = best;
                    winners.push(best_idx);
                }
            }
        }
        (out, winners)
    }

    /// Routes each upstream gradient back to the element that won its window.
    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let cache = self.cache.take()
            .expect("MaxPool2d::backward called without a preceding forward_train");
        let mut grad_input = Tensor::zeros(&cache.input_shape);
        for (&idx, &g) in cache.winners.iter().zip(grad_output.data.iter()) {
            grad_input.data[idx] += g;
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sizes_are_floored() {
        let pool = MaxPool2d::new(2);
        assert_eq!(pool.output_shape(&[1, 32, 26, 26]).unwrap(), vec![1, 32, 13, 13]);
        assert_eq!(pool.output_shape(&[1, 64, 11, 11]).unwrap(), vec![1, 64, 5, 5]);
    }

    #[test]
    fn picks_window_maximum_and_routes_gradient_back() {
        let mut pool = MaxPool2d::new(2);
        let x = Tensor::from_vec(&[1, 1, 2, 4], vec![
            1.0, 9.0, 3.0, 2.0,
            4.0, 0.0, 8.0, 5.0,
        ]);
        let y = pool.forward_train(&x);
        assert_eq!(y.shape, vec![1, 1, 1, 2]);
        assert_eq!(y.data, vec![9.0, 8.0]);

        let g = pool.backward(&Tensor::from_vec(&[1, 1, 1, 2], vec![0.5, -1.0]));
        assert_eq!(g.data, vec![0.0, 0.5, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0]);
    }
}
