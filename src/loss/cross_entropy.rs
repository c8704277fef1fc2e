use crate::math::tensor::Tensor;

/// Sparse categorical cross-entropy for use with a Softmax output layer.
/// Targets are class indices rather than one-hot vectors.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f32 = 1e-7;

impl CrossEntropyLoss {
    /// Scalar loss for one sample: L = -log(predicted[label] + eps)
    pub fn loss(predicted: &[f32], label: usize) -> f32 {
        -(predicted[label] + EPS).ln()
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the pre-softmax
    /// logits:
    ///   ∂L/∂z_i = predicted[i] - [i == label]
    ///
    /// The Softmax layer's own derivative is identity (1.0) so the combined
    /// gradient is not double-applied.
    pub fn derivative(predicted: &[f32], label: usize) -> Vec<f32> {
        predicted.iter().enumerate()
            .map(|(i, p)| if i == label { p - 1.0 } else { *p })
            .collect()
    }

    /// Mean loss over a `(batch, classes)` probability tensor, plus the
    /// gradient of that mean w.r.t. the logits (already divided by the batch
    /// size).
    pub fn batch(predicted: &Tensor, labels: &[u8]) -> (f32, Tensor) {
        let batch = predicted.shape[0];
        assert_eq!(batch, labels.len(), "predictions and labels must have equal length");
        let inv_batch = 1.0 / batch as f32;

        let mut total = 0.0;
        let mut grad = Vec::with_capacity(predicted.len());
        for (r, &label) in labels.iter().enumerate() {
            let row = predicted.row(r);
            total += Self::loss(row, label as usize);
            grad.extend(Self::derivative(row, label as usize).into_iter().map(|g| g * inv_batch));
        }
        (total * inv_batch, Tensor::from_vec(&predicted.shape, grad))
    }
}
