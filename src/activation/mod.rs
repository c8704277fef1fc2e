pub mod activation;

pub use activation::{ActivationFunction, softmax_rows};
