use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or write a JSON model artifact.
#[derive(Debug, Error)]
pub enum ModelIoError {
    #[error("cannot access model file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file '{path}' is not a valid model: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model file '{path}' has an incompatible architecture: {reason}")]
    Architecture { path: PathBuf, reason: String },
}

/// Failure to turn uploaded bytes into a normalized input tensor.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not decode image: degenerate {width}x{height} image")]
    Degenerate { width: u32, height: u32 },
}

/// Failure to load an IDX dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed IDX data: {0}")]
    Format(String),
}

/// Every way a prediction request can fail.
///
/// `ModelUnavailable` is process-level and permanent until the model is
/// reloaded; the other two are per request. None of them are retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Model not loaded on server: {0}")]
    ModelUnavailable(String),
    #[error("Image decoding failed: {0}")]
    ImageDecode(#[from] PreprocessError),
    #[error("Inference failed: {0}")]
    Inference(String),
}

impl ServiceError {
    /// Stable machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ModelUnavailable(_) => "model_unavailable",
            ServiceError::ImageDecode(_) => "image_decode",
            ServiceError::Inference(_) => "inference",
        }
    }
}
