pub mod batch_norm;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod flatten;
pub mod max_pool;
pub mod param;

pub use batch_norm::BatchNorm2d;
pub use conv2d::{Conv2d, Padding};
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use max_pool::MaxPool2d;
pub use param::Param;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;

/// One stage of a sequential network.
///
/// Every variant exposes the same three passes:
/// - `forward`       : inference only, takes `&self` so a loaded model can be
///                     shared read-only across threads
/// - `forward_train` : training pass; caches what `backward` needs
/// - `backward`      : accumulates parameter gradients, returns ∂L/∂input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    BatchNorm(BatchNorm2d),
    MaxPool(MaxPool2d),
    Flatten(Flatten),
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    /// Shape this layer produces for `input`, or why it cannot accept it.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        match self {
            Layer::Conv2d(l)    => l.output_shape(input),
            Layer::BatchNorm(l) => l.output_shape(input),
            Layer::MaxPool(l)   => l.output_shape(input),
            Layer::Flatten(l)   => l.output_shape(input),
            Layer::Dense(l)     => l.output_shape(input),
            Layer::Dropout(_)   => Ok(input.to_vec()),
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        match self {
            Layer::Conv2d(l)    => l.forward(input),
            Layer::BatchNorm(l) => l.forward(input),
            Layer::MaxPool(l)   => l.forward(input),
            Layer::Flatten(l)   => l.forward(input),
            Layer::Dense(l)     => l.forward(input),
            Layer::Dropout(l)   => l.forward(input),
        }
    }

    pub fn forward_train<R: Rng + ?Sized>(&mut self, input: &Tensor, rng: &mut R) -> Tensor {
        match self {
            Layer::Conv2d(l)    => l.forward_train(input),
            Layer::BatchNorm(l) => l.forward_train(input),
            Layer::MaxPool(l)   => l.forward_train(input),
            Layer::Flatten(l)   => l.forward_train(input),
            Layer::Dense(l)     => l.forward_train(input),
            Layer::Dropout(l)   => l.forward_train(input, rng),
        }
    }

    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        match self {
            Layer::Conv2d(l)    => l.backward(grad_output),
            Layer::BatchNorm(l) => l.backward(grad_output),
            Layer::MaxPool(l)   => l.backward(grad_output),
            Layer::Flatten(l)   => l.backward(grad_output),
            Layer::Dense(l)     => l.backward(grad_output),
            Layer::Dropout(l)   => l.backward(grad_output),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        match self {
            Layer::Conv2d(l)    => l.params_mut(),
            Layer::BatchNorm(l) => l.params_mut(),
            Layer::Dense(l)     => l.params_mut(),
            Layer::MaxPool(_) | Layer::Flatten(_) | Layer::Dropout(_) => Vec::new(),
        }
    }

    /// Short human-readable description used in logs.
    pub fn describe(&self) -> String {
        match self {
            Layer::Conv2d(l) => format!(
                "conv2d {}->{} {}x{} {:?} {:?}",
                l.in_channels, l.out_channels, l.kernel_size, l.kernel_size, l.padding, l.activator
            ),
            Layer::BatchNorm(l) => format!("batch_norm {}", l.channels),
            Layer::MaxPool(l)   => format!("max_pool {}x{}", l.size, l.size),
            Layer::Flatten(_)   => "flatten".to_owned(),
            Layer::Dense(l)     => format!("dense {}->{} {:?}", l.input_size, l.size, l.activator),
            Layer::Dropout(l)   => format!("dropout {}", l.rate),
        }
    }
}
