use serde_json::json;
use tracing::{info, warn};

use ferrite_digits::InferenceService;

use crate::routes::ApiResponse;
use crate::util::multipart::{extract_boundary, extract_file_field};

/// Form field that carries the uploaded image.
pub const IMAGE_FIELD: &str = "image";

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

pub fn handle(content_type: &str, body: &[u8], service: &InferenceService) -> ApiResponse {
    let image = content_type
        .starts_with("multipart/form-data")
        .then(|| extract_boundary(content_type))
        .flatten()
        .and_then(|boundary| extract_file_field(body, &boundary, IMAGE_FIELD));

    let image = match image {
        Some(bytes) => bytes,
        None => {
            return ApiResponse::error(
                422,
                "Request must be multipart/form-data with an 'image' file field.",
                "missing_image",
            )
        }
    };

    match service.predict_image(&image) {
        Ok(result) => {
            info!(prediction = result.prediction, bytes = image.len(), "prediction");
            ApiResponse::ok(json!({
                "prediction": result.prediction,
                "scores": result.scores,
            }))
        }
        Err(err) => {
            warn!(kind = err.kind(), error = %err, "prediction failed");
            ApiResponse::error(500, &err.to_string(), err.kind())
        }
    }
}
