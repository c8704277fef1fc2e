use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::ModelIoError;
use crate::layers::{BatchNorm2d, Conv2d, Dense, Dropout, Flatten, Layer, MaxPool2d, Param};
use crate::math::tensor::Tensor;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::{LayerSpec, NetworkSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Channels, height and width of one input sample.
    pub input_shape: [usize; 3],
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl Network {
    /// Builds a freshly initialized network from an architecture description.
    pub fn from_spec<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Network {
        let layers = spec.layers.iter()
            .map(|layer| match *layer {
                LayerSpec::Conv2d { in_channels, out_channels, kernel_size, padding, activation } => {
                    Layer::Conv2d(Conv2d::new(in_channels, out_channels, kernel_size, padding, activation, &mut *rng))
                }
                LayerSpec::BatchNorm { channels } => Layer::BatchNorm(BatchNorm2d::new(channels)),
                LayerSpec::MaxPool { size } => Layer::MaxPool(MaxPool2d::new(size)),
                LayerSpec::Flatten => Layer::Flatten(Flatten::new()),
                LayerSpec::Dense { input_size, size, activation } => {
                    Layer::Dense(Dense::new(input_size, size, activation, &mut *rng))
                }
                LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(rate)),
            })
            .collect();
        Network {
            input_shape: spec.input_shape,
            layers,
            metadata: spec.metadata.clone(),
        }
    }

    /// Walks the layer stack and returns the output shape for `input`, or a
    /// description of the first layer that cannot accept its input.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        self.layers.iter().enumerate().try_fold(input.to_vec(), |shape, (i, layer)| {
            layer.output_shape(&shape)
                .map_err(|e| format!("layer {} ({}): {}", i, layer.describe(), e))
        })
    }

    /// Inference-mode forward pass; never mutates the network.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.forward(&current);
        }
        current
    }

    /// Training-mode forward pass; stores what each layer needs for backprop.
    pub fn forward_train<R: Rng + ?Sized>(&mut self, input: &Tensor, rng: &mut R) -> Tensor {
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward_train(&current, rng);
        }
        current
    }

    /// Backpropagates ∂L/∂output through every layer, accumulating gradients.
    pub fn backward(&mut self, grad_output: &Tensor) {
        let mut delta = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta);
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    pub fn zero_grad(&mut self) {
        for param in self.params_mut() {
            param.zero_grad();
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter()
            .map(|layer| match layer {
                Layer::Conv2d(l) => l.weights.value.len() + l.biases.value.len(),
                Layer::BatchNorm(l) => l.gamma.value.len() + l.beta.value.len(),
                Layer::Dense(l) => l.weights.value.len() + l.biases.value.len(),
                Layer::MaxPool(_) | Layer::Flatten(_) | Layer::Dropout(_) => 0,
            })
            .sum()
    }

    /// Serializes the network weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ModelIoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|source| ModelIoError::Io { path: parent.to_path_buf(), source })?;
        }
        let file = File::create(path)
            .map_err(|source| ModelIoError::Io { path: path.to_path_buf(), source })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|source| ModelIoError::Json { path: path.to_path_buf(), source })
    }

    /// Deserializes a network from a JSON file previously written by
    /// `save_json` and checks that its layers chain together.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Network, ModelIoError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| ModelIoError::Io { path: path.to_path_buf(), source })?;
        let network: Network = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ModelIoError::Json { path: path.to_path_buf(), source })?;

        let [c, h, w] = network.input_shape;
        network.output_shape(&[1, c, h, w])
            .map_err(|reason| ModelIoError::Architecture { path: path.to_path_buf(), reason })?;
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use rand::{rngs::StdRng, SeedableRng};

    fn tiny_spec() -> NetworkSpec {
        NetworkSpec {
            name: "tiny".to_owned(),
            layers: vec![
                LayerSpec::Conv2d {
                    in_channels: 1,
                    out_channels: 2,
                    kernel_size: 3,
                    padding: crate::layers::Padding::Same,
                    activation: ActivationFunction::ReLU,
                },
                LayerSpec::BatchNorm { channels: 2 },
                LayerSpec::MaxPool { size: 2 },
                LayerSpec::Flatten,
                LayerSpec::Dense { input_size: 2 * 2 * 2, size: 3, activation: ActivationFunction::Softmax },
            ],
            input_shape: [1, 4, 4],
            metadata: None,
        }
    }

    #[test]
    fn digit_cnn_maps_one_image_to_ten_scores() {
        let network = Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(0));
        assert_eq!(network.output_shape(&[1, 1, 28, 28]).unwrap(), vec![1, 10]);
        assert!(network.output_shape(&[1, 3, 28, 28]).is_err());
    }

    #[test]
    fn digit_cnn_parameter_count() {
        let network = Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(0));
        let convs = (32 * 9 + 32) + (32 * 32 * 9 + 32) + (64 * 32 * 9 + 64) + (64 * 64 * 9 + 64);
        let norms = 2 * 32 + 2 * 64;
        let dense = (1600 * 256 + 256) + (256 * 10 + 10);
        assert_eq!(network.parameter_count(), convs + norms + dense);
    }

    #[test]
    fn forward_produces_probability_rows() {
        let network = Network::from_spec(&tiny_spec(), &mut StdRng::seed_from_u64(5));
        let x = Tensor::from_vec(&[2, 1, 4, 4], (0..32).map(|i| i as f32 / 32.0).collect());
        let y = network.forward(&x);
        assert_eq!(y.shape, vec![2, 3]);
        for r in 0..2 {
            assert!((y.row(r).iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn save_then_load_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tiny.json");
        let network = Network::from_spec(&tiny_spec(), &mut StdRng::seed_from_u64(9));
        network.save_json(&path).unwrap();

        let loaded = Network::load_json(&path).unwrap();
        let x = Tensor::from_vec(&[1, 1, 4, 4], (0..16).map(|i| (i % 5) as f32 / 5.0).collect());
        assert_eq!(network.forward(&x), loaded.forward(&x));
    }

    #[test]
    fn load_rejects_garbage_and_broken_architectures() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"not json").unwrap();
        assert!(matches!(Network::load_json(&garbage), Err(ModelIoError::Json { .. })));

        let mut network = Network::from_spec(&tiny_spec(), &mut StdRng::seed_from_u64(9));
        network.input_shape = [3, 4, 4];
        let broken = dir.path().join("broken.json");
        network.save_json(&broken).unwrap();
        assert!(matches!(Network::load_json(&broken), Err(ModelIoError::Architecture { .. })));

        let missing = dir.path().join("missing.json");
        assert!(matches!(Network::load_json(&missing), Err(ModelIoError::Io { .. })));
    }
}
