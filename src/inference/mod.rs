pub mod model;
pub mod service;

pub use model::{DigitModel, NUM_CLASSES};
pub use service::{argmax, InferenceService, PredictionResult, ServiceStatus};
