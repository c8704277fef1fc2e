use crate::math::tensor::Tensor;
use crate::network::network::Network;

/// Number of digit classes the serving path expects.
pub const NUM_CLASSES: usize = 10;

/// A loaded classifier capability: one score vector per batch item.
///
/// Implementations must be usable from many request threads at once, so
/// `predict` takes `&self`.
pub trait DigitModel: Send + Sync {
    /// `batch` has shape `(n, 1, 28, 28)`; returns `n` rows of class scores.
    fn predict(&self, batch: &Tensor) -> Result<Vec<Vec<f32>>, String>;

    /// Short description shown by the status endpoint.
    fn describe(&self) -> String;
}

impl DigitModel for Network {
    fn predict(&self, batch: &Tensor) -> Result<Vec<Vec<f32>>, String> {
        let out_shape = self.output_shape(&batch.shape)?;
        if out_shape.len() != 2 || out_shape[0] != batch.shape[0] {
            return Err(format!("model produced shape {:?} for input {:?}", out_shape, batch.shape));
        }
        let output = self.forward(batch);
        Ok(output.data.chunks(out_shape[1]).map(|row| row.to_vec()).collect())
    }

    fn describe(&self) -> String {
        self.metadata.as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| format!("{}-layer network", self.layers.len()))
    }
}
