// Route exports
pub mod participants;

use actix_web::{error, http::StatusCode, web, HttpRequest, HttpResponse};
use std::fmt;

use crate::models::ErrorResponse;
use crate::services::ParticipantStore;

pub use participants::AppState;

pub fn configure_routes<S: ParticipantStore>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(participants::configure::<S>),
    );
}

/// Extractor failure rendered as a JSON error body
#[derive(Debug)]
pub struct PayloadError(ErrorResponse);

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.error, self.0.message)
    }
}

impl std::error::Error for PayloadError {}

impl error::ResponseError for PayloadError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(&self.0)
    }
}

/// Handle JSON payload errors, including unknown `type`/`match_mode` values
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    let status = match &err {
        error::JsonPayloadError::OverflowKnownLength { .. } | error::JsonPayloadError::Overflow { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => StatusCode::BAD_REQUEST,
    };
    PayloadError(ErrorResponse {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: status.as_u16(),
    })
    .into()
}

/// JSON extractor configuration sized for base64 image uploads
pub fn json_config(max_image_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(max_image_bytes + 64 * 1024)
        .error_handler(handle_json_payload_error)
}
