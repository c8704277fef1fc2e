use std::path::Path;

use serde::Serialize;
use tracing::{error, info};

use crate::error::ServiceError;
use crate::inference::model::{DigitModel, NUM_CLASSES};
use crate::network::network::Network;
use crate::preprocess::{self, NormalizedTensor};

/// The predicted digit and the full score vector it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub prediction: usize,
    pub scores: Vec<f32>,
}

/// Body of the liveness endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub message: String,
}

enum ModelState {
    Loaded(Box<dyn DigitModel>),
    Unavailable(String),
}

/// Immutable prediction service built once at startup and shared by every
/// request handler.
///
/// When the model could not be loaded the service still exists, in degraded
/// mode: predictions fail with `ServiceError::ModelUnavailable` and
/// `status()` reports why.
pub struct InferenceService {
    model: ModelState,
}

impl InferenceService {
    pub fn new(model: impl DigitModel + 'static) -> InferenceService {
        InferenceService { model: ModelState::Loaded(Box::new(model)) }
    }

    /// A service with no model; every prediction fails.
    pub fn unavailable(reason: impl Into<String>) -> InferenceService {
        InferenceService { model: ModelState::Unavailable(reason.into()) }
    }

    /// Loads the JSON model artifact at `path`. Never fails: a load error, or
    /// a network that does not map a `(1, 28, 28)` image onto ten class
    /// scores, yields a degraded service instead.
    pub fn load(path: impl AsRef<Path>) -> InferenceService {
        let path = path.as_ref();
        let loaded = Network::load_json(path)
            .map_err(|e| e.to_string())
            .and_then(|network| check_digit_contract(&network).map(|()| network));
        match loaded {
            Ok(network) => {
                info!(path = %path.display(), layers = network.layers.len(), "model loaded");
                InferenceService::new(network)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "model failed to load; serving in degraded mode");
                InferenceService::unavailable(e)
            }
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        matches!(self.model, ModelState::Loaded(_))
    }

    pub fn status(&self) -> ServiceStatus {
        match &self.model {
            ModelState::Loaded(model) => ServiceStatus {
                status: "ok",
                model_loaded: true,
                message: format!("Prediction API is running. Model: {}.", model.describe()),
            },
            ModelState::Unavailable(reason) => ServiceStatus {
                status: "degraded",
                model_loaded: false,
                message: format!("Prediction API is running without a model: {}", reason),
            },
        }
    }

    fn model(&self) -> Result<&dyn DigitModel, ServiceError> {
        match &self.model {
            ModelState::Loaded(model) => Ok(model.as_ref()),
            ModelState::Unavailable(reason) => Err(ServiceError::ModelUnavailable(reason.clone())),
        }
    }

    /// Preprocesses encoded image bytes and classifies them.
    ///
    /// Model availability is checked before the bytes are decoded.
    pub fn predict_image(&self, bytes: &[u8]) -> Result<PredictionResult, ServiceError> {
        let model = self.model()?;
        let tensor = preprocess::preprocess(bytes)?;
        run(model, &tensor)
    }

    /// Classifies an already preprocessed tensor.
    pub fn predict_tensor(&self, tensor: &NormalizedTensor) -> Result<PredictionResult, ServiceError> {
        run(self.model()?, tensor)
    }
}

/// A servable network takes one `(1, 28, 28)` sample and yields `(1, 10)`.
fn check_digit_contract(network: &Network) -> Result<(), String> {
    if network.input_shape != NormalizedTensor::SHAPE {
        return Err(format!(
            "model expects input {:?}, the preprocessor produces {:?}",
            network.input_shape,
            NormalizedTensor::SHAPE
        ));
    }
    let mut batch = vec![1];
    batch.extend(NormalizedTensor::SHAPE);
    let output = network.output_shape(&batch)?;
    if output != [1, NUM_CLASSES] {
        return Err(format!("model produces {:?}, expected [1, {}]", output, NUM_CLASSES));
    }
    Ok(())
}

fn run(model: &dyn DigitModel, tensor: &NormalizedTensor) -> Result<PredictionResult, ServiceError> {
    let rows = model.predict(&tensor.to_batch()).map_err(ServiceError::Inference)?;
    let scores = match <[Vec<f32>; 1]>::try_from(rows) {
        Ok([row]) => row,
        Err(rows) => {
            return Err(ServiceError::Inference(format!(
                "expected 1 output row for a batch of 1, got {}", rows.len()
            )))
        }
    };
    if scores.len() != NUM_CLASSES {
        return Err(ServiceError::Inference(format!(
            "expected {} class scores, got {}", NUM_CLASSES, scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ServiceError::Inference("model produced non-finite scores".to_owned()));
    }
    Ok(PredictionResult { prediction: argmax(&scores), scores })
}

/// Index of the largest score; the lowest index wins ties.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PreprocessError;
    use crate::math::tensor::Tensor;
    use crate::network::spec::NetworkSpec;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
    use rand::{rngs::StdRng, SeedableRng};
    use std::io::Cursor;
    use std::sync::Arc;

    /// Returns fixed rows regardless of input.
    struct FixedModel(Vec<Vec<f32>>);

    impl DigitModel for FixedModel {
        fn predict(&self, _batch: &Tensor) -> Result<Vec<Vec<f32>>, String> {
            Ok(self.0.clone())
        }
        fn describe(&self) -> String {
            "fixed".to_owned()
        }
    }

    struct FailingModel;

    impl DigitModel for FailingModel {
        fn predict(&self, _batch: &Tensor) -> Result<Vec<Vec<f32>>, String> {
            Err("shape mismatch".to_owned())
        }
        fn describe(&self) -> String {
            "failing".to_owned()
        }
    }

    fn white_png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([255])))
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn scores_with_peak(peak: usize) -> Vec<f32> {
        let mut s = vec![0.01; 10];
        s[peak] = 0.91;
        s
    }

    #[test]
    fn argmax_breaks_ties_toward_lower_index() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.0, 0.2, 0.9]), 2);
    }

    #[test]
    fn white_png_with_real_network_gives_valid_prediction() {
        let network = Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(42));
        let service = InferenceService::new(network);
        let result = service.predict_image(&white_png()).unwrap();
        assert!(result.prediction <= 9);
        assert_eq!(result.scores.len(), 10);
        assert!(result.scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!((result.scores.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(result.prediction, argmax(&result.scores));
    }

    #[test]
    fn prediction_is_argmax_of_model_scores() {
        let service = InferenceService::new(FixedModel(vec![scores_with_peak(7)]));
        let result = service.predict_image(&white_png()).unwrap();
        assert_eq!(result.prediction, 7);
        assert_eq!(result.scores, scores_with_peak(7));
    }

    #[test]
    fn preprocessed_tensor_predicts_like_raw_bytes() {
        let network = Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(8));
        let service = InferenceService::new(network);
        let tensor = preprocess::preprocess(&white_png()).unwrap();
        assert_eq!(service.predict_tensor(&tensor).unwrap(), service.predict_image(&white_png()).unwrap());
    }

    #[test]
    fn unavailable_model_is_reported_before_decoding() {
        let service = InferenceService::unavailable("no such file");
        // Garbage bytes would be a decode error if they were looked at.
        let err = service.predict_image(b"garbage").unwrap_err();
        assert!(matches!(err, ServiceError::ModelUnavailable(_)));
        assert!(!service.is_model_loaded());

        let status = service.status();
        assert!(!status.model_loaded);
        assert_eq!(status.status, "degraded");
        assert!(status.message.contains("no such file"));
    }

    #[test]
    fn load_of_missing_file_degrades_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::load(dir.path().join("absent.json"));
        assert!(!service.is_model_loaded());
        assert!(matches!(service.predict_image(&white_png()), Err(ServiceError::ModelUnavailable(_))));
    }

    #[test]
    fn load_of_saved_network_serves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnist_cnn.json");
        Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(1))
            .save_json(&path)
            .unwrap();
        let service = InferenceService::load(&path);
        assert!(service.status().model_loaded);
        assert!(service.predict_image(&white_png()).is_ok());
    }

    fn save_spec(spec: &NetworkSpec) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        Network::from_spec(spec, &mut StdRng::seed_from_u64(2)).save_json(&path).unwrap();
        (dir, path)
    }

    fn dense_spec(input_shape: [usize; 3], classes: usize) -> NetworkSpec {
        use crate::activation::ActivationFunction;
        use crate::network::spec::LayerSpec;
        NetworkSpec {
            name: "dense".to_owned(),
            layers: vec![
                LayerSpec::Flatten,
                LayerSpec::Dense {
                    input_size: input_shape.iter().product(),
                    size: classes,
                    activation: ActivationFunction::Softmax,
                },
            ],
            input_shape,
            metadata: None,
        }
    }

    #[test]
    fn load_rejects_model_with_wrong_class_count() {
        let (_dir, path) = save_spec(&dense_spec([1, 28, 28], 5));
        let service = InferenceService::load(&path);
        assert!(!service.is_model_loaded());
        let status = service.status();
        assert_eq!(status.status, "degraded");
        assert!(status.message.contains("[1, 5]"), "{}", status.message);
        assert!(matches!(service.predict_image(&white_png()), Err(ServiceError::ModelUnavailable(_))));
    }

    #[test]
    fn load_rejects_model_with_wrong_input_size() {
        let (_dir, path) = save_spec(&dense_spec([1, 32, 32], 10));
        let service = InferenceService::load(&path);
        assert!(!service.is_model_loaded());
        assert!(service.status().message.contains("[1, 32, 32]"));
    }

    #[test]
    fn load_accepts_any_network_with_the_digit_contract() {
        let (_dir, path) = save_spec(&dense_spec([1, 28, 28], 10));
        assert!(InferenceService::load(&path).is_model_loaded());
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let service = InferenceService::new(FixedModel(vec![scores_with_peak(1)]));
        let err = service.predict_image(b"\x89PNG\r\n\x1a\nnope").unwrap_err();
        assert!(matches!(err, ServiceError::ImageDecode(PreprocessError::Decode(_))));
        assert_eq!(err.kind(), "image_decode");
    }

    #[test]
    fn model_failures_are_inference_errors() {
        let service = InferenceService::new(FailingModel);
        let err = service.predict_image(&white_png()).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));

        let short = InferenceService::new(FixedModel(vec![vec![0.5, 0.5]]));
        assert!(matches!(short.predict_image(&white_png()), Err(ServiceError::Inference(_))));

        let two_rows = InferenceService::new(FixedModel(vec![scores_with_peak(0), scores_with_peak(1)]));
        assert!(matches!(two_rows.predict_image(&white_png()), Err(ServiceError::Inference(_))));
    }

    #[test]
    fn service_is_shareable_across_threads() {
        let network = Network::from_spec(&NetworkSpec::digit_cnn(), &mut StdRng::seed_from_u64(3));
        let service = Arc::new(InferenceService::new(network));
        let bytes = white_png();
        let expected = service.predict_image(&bytes).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let bytes = bytes.clone();
                std::thread::spawn(move || service.predict_image(&bytes).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn prediction_serializes_to_the_wire_shape() {
        let result = PredictionResult { prediction: 3, scores: vec![0.5; 10] };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["prediction"], 3);
        assert_eq!(json["scores"].as_array().unwrap().len(), 10);
    }
}
