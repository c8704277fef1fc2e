use std::io::{Cursor, Read};

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use ferrite_digits::InferenceService;

use crate::handlers;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// A handler's answer before it is written to the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> ApiResponse {
        ApiResponse { status: 200, body }
    }

    /// `{"detail": ..., "error": ...}` with the given status code.
    pub fn error(status: u16, detail: &str, kind: &str) -> ApiResponse {
        ApiResponse { status, body: json!({ "detail": detail, "error": kind }) }
    }

    pub fn not_found() -> ApiResponse {
        ApiResponse { status: 404, body: json!({ "detail": "Not Found" }) }
    }
}

pub fn json_response(api: ApiResponse) -> Response<Cursor<Vec<u8>>> {
    let bytes = api.body.to_string().into_bytes();
    let len = bytes.len();
    Response::new(
        StatusCode(api.status),
        vec![Header::from_bytes(b"Content-Type", b"application/json").unwrap()],
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Maps a request onto its handler. Kept free of I/O so it can be exercised
/// without a socket.
pub fn route(
    method: &Method,
    path: &str,
    content_type: &str,
    body: &[u8],
    service: &InferenceService,
) -> ApiResponse {
    match (method, path) {
        (Method::Get, "/")         => handlers::status::handle(service),
        (Method::Post, "/predict") => handlers::predict::handle(content_type, body, service),
        _ => ApiResponse::not_found(),
    }
}

/// Reads the request, routes it and writes the JSON response.
pub fn dispatch(mut request: Request, service: &InferenceService) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let content_type = request.headers().iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();

    let mut body = Vec::new();
    let response = match request.as_reader().read_to_end(&mut body) {
        Ok(_) => route(&method, &path, &content_type, &body, service),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            ApiResponse::error(400, "Could not read request body.", "bad_request")
        }
    };
    debug!(%method, %path, status = response.status, "request");

    if let Err(e) = request.respond(json_response(response)) {
        warn!(error = %e, "failed to send response");
    }
}
