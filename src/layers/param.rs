use serde::{Serialize, Deserialize};
use crate::math::tensor::Tensor;

/// A learnable tensor together with its accumulated gradient.
///
/// Only `value` is persisted; the gradient buffer is rebuilt lazily after a
/// model is loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub value: Tensor,
    #[serde(skip)]
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad }
    }

    /// Mutable access to the gradient buffer, allocating it if needed.
    pub fn grad_mut(&mut self) -> &mut [f32] {
        if self.grad.shape != self.value.shape {
            self.grad = Tensor::zeros(&self.value.shape);
        }
        &mut self.grad.data
    }

    pub fn zero_grad(&mut self) {
        self.grad_mut().iter_mut().for_each(|g| *g = 0.0);
    }
}
