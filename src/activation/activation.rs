use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
    /// Softmax is a vector-valued activation; it is applied row-wise at the
    /// layer level in `Dense::forward()`.  The element-wise `function()`
    /// and `derivative()` methods are therefore not used for this variant.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation.  `Softmax` goes through `softmax_rows()`.
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
            ActivationFunction::Softmax => {
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use softmax_rows() which applies the full-vector softmax.")
            }
        }
    }

    /// Element-wise derivative of the activation, evaluated at the
    /// pre-activation value.
    ///
    /// For `Softmax`, the output layer is paired with cross-entropy and the
    /// combined gradient is `predicted - expected` (already computed by
    /// `CrossEntropyLoss::batch()`).  Returning `1.0` passes that delta
    /// through unchanged.
    pub fn derivative(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Softmax => 1.0,
        }
    }
}

/// Numerically stable softmax over each row of a `(rows, cols)` buffer.
pub fn softmax_rows(data: &mut [f32], cols: usize) {
    for row in data.chunks_mut(cols) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}
