pub mod idx;

pub use idx::parse_idx_pair;

use std::path::Path;

use tracing::info;

use crate::error::DatasetError;
use crate::math::tensor::Tensor;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Labelled single-channel images with pixels in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// All images back to back, row-major, `rows * cols` values each.
    pub images: Vec<f32>,
    pub labels: Vec<u8>,
    pub rows: usize,
    pub cols: usize,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sample(&self, i: usize) -> &[f32] {
        let n = self.rows * self.cols;
        &self.images[i * n..(i + 1) * n]
    }

    /// Keeps only the first `n` samples.
    pub fn truncate(&mut self, n: usize) {
        if n < self.len() {
            self.labels.truncate(n);
            self.images.truncate(n * self.rows * self.cols);
        }
    }

    /// Gathers the given samples into a `(batch, 1, rows, cols)` tensor plus
    /// their labels.
    pub fn batch(&self, indices: &[usize]) -> (Tensor, Vec<u8>) {
        let mut data = Vec::with_capacity(indices.len() * self.rows * self.cols);
        for &i in indices {
            data.extend_from_slice(self.sample(i));
        }
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        (Tensor::from_vec(&[indices.len(), 1, self.rows, self.cols], data), labels)
    }
}

/// Loads the standard MNIST training and test splits from `dir`.
pub fn load_mnist_dir(dir: impl AsRef<Path>) -> Result<(Dataset, Dataset), DatasetError> {
    let dir = dir.as_ref();
    let train = load_pair(dir, TRAIN_IMAGES, TRAIN_LABELS)?;
    let test = load_pair(dir, TEST_IMAGES, TEST_LABELS)?;
    info!(train = train.len(), test = test.len(), dir = %dir.display(), "MNIST loaded");
    Ok((train, test))
}

fn load_pair(dir: &Path, images: &str, labels: &str) -> Result<Dataset, DatasetError> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read(&path).map_err(|source| DatasetError::Io { path, source })
    };
    parse_idx_pair(&read(images)?, &read(labels)?, 10)
}
