use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// Collapses `(batch, c, h, w)` into `(batch, c * h * w)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flatten {
    #[serde(skip)]
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Flatten {
        Flatten::default()
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        if input.is_empty() {
            return Err("flatten needs a batch dimension".to_owned());
        }
        Ok(vec![input[0], input[1..].iter().product()])
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let batch = input.shape[0];
        input.clone().reshape(&[batch, input.len() / batch.max(1)])
    }

    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        self.input_shape = Some(input.shape.clone());
        self.forward(input)
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let shape = self.input_shape.take()
            .expect("Flatten::backward called without a preceding forward_train");
        grad_output.clone().reshape(&shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_round_trips_shape_through_backward() {
        let mut f = Flatten::new();
        let x = Tensor::zeros(&[2, 64, 5, 5]);
        let y = f.forward_train(&x);
        assert_eq!(y.shape, vec![2, 1600]);
        let g = f.backward(&y);
        assert_eq!(g.shape, vec![2, 64, 5, 5]);
    }
}
