use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::layers::conv2d::Padding;
use crate::network::metadata::ModelMetadata;

/// Describes one layer in a network specification, without its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: Padding,
        activation: ActivationFunction,
    },
    BatchNorm { channels: usize },
    MaxPool { size: usize },
    Flatten,
    Dense {
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
    },
    Dropout { rate: f32 },
}

/// A description of a network architecture plus the metadata stamped onto
/// the model built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as the default model file stem.
    pub name: String,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    /// Channels, height and width of one input sample.
    pub input_shape: [usize; 3],
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// The fixed digit classifier topology: two convolutional blocks with
    /// batch normalization and max pooling, then a dense classifier with
    /// dropout.
    ///
    /// ```text
    /// 1x28x28 → conv 32 same → bn → conv 32 valid → pool → 32x13x13
    ///         → conv 64 same → bn → conv 64 valid → pool → 64x5x5
    ///         → flatten 1600 → dense 256 → dropout 0.4 → dense 10 softmax
    /// ```
    pub fn digit_cnn() -> NetworkSpec {
        use ActivationFunction::{ReLU, Softmax};
        let conv = |in_channels, out_channels, padding| LayerSpec::Conv2d {
            in_channels,
            out_channels,
            kernel_size: 3,
            padding,
            activation: ReLU,
        };

        NetworkSpec {
            name: "mnist_cnn".to_owned(),
            layers: vec![
                conv(1, 32, Padding::Same),
                LayerSpec::BatchNorm { channels: 32 },
                conv(32, 32, Padding::Valid),
                LayerSpec::MaxPool { size: 2 },
                conv(32, 64, Padding::Same),
                LayerSpec::BatchNorm { channels: 64 },
                conv(64, 64, Padding::Valid),
                LayerSpec::MaxPool { size: 2 },
                LayerSpec::Flatten,
                LayerSpec::Dense { input_size: 64 * 5 * 5, size: 256, activation: ReLU },
                LayerSpec::Dropout { rate: 0.4 },
                LayerSpec::Dense { input_size: 256, size: 10, activation: Softmax },
            ],
            input_shape: [1, 28, 28],
            metadata: Some(ModelMetadata::digits()),
        }
    }
}
