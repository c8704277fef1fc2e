use serde::{Deserialize, Serialize};

/// Describes how to interpret the input fed to a Network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// Single-channel image of width×height, values in [0, 1].
    ImageGrayscale { width: u32, height: u32 },
}

/// Optional annotations attached to a saved Network.
/// All fields are Option<> so models saved without them deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Human-readable class labels for the output layer (e.g. ["0","1",...,"9"]).
    pub output_labels: Option<Vec<String>>,
    /// Number of epochs the saved weights were trained for.
    #[serde(default)]
    pub trained_epochs: Option<usize>,
    /// Validation accuracy after the final epoch, as a fraction in [0, 1].
    #[serde(default)]
    pub val_accuracy: Option<f64>,
}

impl ModelMetadata {
    /// Metadata for a 28×28 grayscale, ten-class digit classifier.
    pub fn digits() -> ModelMetadata {
        ModelMetadata {
            description: Some("Handwritten digit classifier (MNIST, 28x28 grayscale)".to_owned()),
            input_type: Some(InputType::ImageGrayscale { width: 28, height: 28 }),
            output_labels: Some((0..10).map(|d| d.to_string()).collect()),
            trained_epochs: None,
            val_accuracy: None,
        }
    }
}
