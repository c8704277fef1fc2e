use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::{ActivationFunction, softmax_rows};
use crate::layers::param::Param;
use crate::math::tensor::Tensor;

/// Fully connected layer operating on `(batch, input_size)` tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub input_size: usize,
    pub size: usize,
    /// Shape `(input_size, size)`.
    pub weights: Param,
    /// Shape `(size)`.
    pub biases: Param,
    pub activator: ActivationFunction,
    #[serde(skip)]
    cache: Option<DenseCache>,
}

#[derive(Debug, Clone)]
struct DenseCache {
    input: Tensor,
    pre_activation: Tensor, // z = xW + b, needed for the activation derivative
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = match activation {
            ActivationFunction::ReLU => Tensor::he(&[input_size, size], input_size, rng),
            _ => Tensor::xavier(&[input_size, size], input_size, rng),
        };
        Dense {
            input_size,
            size,
            weights: Param::new(weights),
            biases: Param::new(Tensor::zeros(&[size])),
            activator: activation,
            cache: None,
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        if input.len() != 2 || input[1] != self.input_size {
            return Err(format!(
                "dense layer expects (batch, {}), got {:?}", self.input_size, input
            ));
        }
        if self.weights.value.shape != [self.input_size, self.size]
            || self.biases.value.len() != self.size
        {
            return Err(format!(
                "dense layer parameters do not match {}x{}", self.input_size, self.size
            ));
        }
        Ok(vec![input[0], self.size])
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let z = self.linear(input);
        self.activate(&z)
    }

    /// Forward pass that keeps the input and pre-activations for `backward`.
    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        let z = self.linear(input);
        let a = self.activate(&z);
        self.cache = Some(DenseCache { input: input.clone(), pre_activation: z });
        a
    }

    /// Accumulates parameter gradients and returns ∂L/∂input.
    /// `grad_output` is ∂L/∂a for this layer (error in activation space).
    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let cache = self.cache.take()
            .expect("Dense::backward called without a preceding forward_train");

        // δ = error ⊙ σ'(z)
        let act_derivative = cache.pre_activation.map(|x| self.activator.derivative(x));
        let delta = grad_output.hadamard(&act_derivative);

        let weights_grad = cache.input.transpose().matmul(&delta);
        for (g, w) in self.weights.grad_mut().iter_mut().zip(weights_grad.data.iter()) {
            *g += w;
        }

        let biases_grad = self.biases.grad_mut();
        for row in delta.data.chunks(self.size) {
            for (g, d) in biases_grad.iter_mut().zip(row) {
                *g += d;
            }
        }

        delta.matmul(&self.weights.value.transpose())
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights, &mut self.biases]
    }

    fn linear(&self, input: &Tensor) -> Tensor {
        let mut z = input.matmul(&self.weights.value);
        for row in z.data.chunks_mut(self.size) {
            for (v, b) in row.iter_mut().zip(self.biases.value.data.iter()) {
                *v += b;
            }
        }
        z
    }

    fn activate(&self, z: &Tensor) -> Tensor {
        match self.activator {
            ActivationFunction::Softmax => {
                let mut a = z.clone();
                softmax_rows(&mut a.data, self.size);
                a
            }
            activator => z.map(|x| activator.function(x)),
        }
    }
}
