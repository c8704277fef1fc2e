pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod dataset;
pub mod preprocess;
pub mod inference;
pub mod error;

// Convenience re-exports
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use layers::Layer;
pub use network::network::Network;
pub use network::spec::NetworkSpec;
pub use loss::cross_entropy::CrossEntropyLoss;
pub use optim::{Adam, Optimizer, Sgd};
pub use train::{train_loop, EpochStats, TrainConfig};
pub use dataset::{load_mnist_dir, Dataset};
pub use preprocess::{preprocess, NormalizedTensor};
pub use inference::{InferenceService, PredictionResult, ServiceStatus};
pub use error::{DatasetError, ModelIoError, PreprocessError, ServiceError};
