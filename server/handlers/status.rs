use serde_json::json;

use ferrite_digits::InferenceService;

use crate::routes::ApiResponse;

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Always 200; whether a model is loaded is part of the body.
pub fn handle(service: &InferenceService) -> ApiResponse {
    let status = service.status();
    ApiResponse::ok(json!({
        "status": status.status,
        "model_loaded": status.model_loaded,
        "message": status.message,
    }))
}
