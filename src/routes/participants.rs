use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use std::net::SocketAddr;
use std::sync::Arc;
use validator::Validate;

use crate::core::{MatchError, MatchingEngine};
use crate::models::{
    ErrorResponse, HealthResponse, MatchSettings, ParticipantId, RegisterRequest,
    RegisterResponse, StatusResponse,
};
use crate::services::{ConfigProvider, IntakeError, ParticipantStore, Submission, SubmissionGateway};

/// Application state shared across all handlers
pub struct AppState<S: ParticipantStore> {
    pub engine: MatchingEngine<S>,
    pub gateway: Arc<SubmissionGateway<S>>,
    pub config: Arc<dyn ConfigProvider>,
}

impl<S: ParticipantStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
        }
    }
}

/// Configure all participant routes
pub fn configure<S: ParticipantStore>(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check::<S>))
        .route("/register", web::post().to(register::<S>))
        .route("/status/{uuid}", web::get().to(get_status::<S>))
        .route("/config", web::get().to(get_config::<S>));
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: message.into(),
        status_code: status.as_u16(),
    })
}

fn intake_error_response(err: &IntakeError) -> HttpResponse {
    let (status, error) = match err {
        IntakeError::UnsupportedImageType => (StatusCode::BAD_REQUEST, "unsupported_image_type"),
        IntakeError::ImageTooLarge { .. } => (StatusCode::BAD_REQUEST, "image_too_large"),
        IntakeError::ScoreOutOfRange { .. } => (StatusCode::BAD_REQUEST, "score_out_of_range"),
        IntakeError::InvalidImage(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
        IntakeError::QrUnreadable(_) => (StatusCode::BAD_REQUEST, "qr_unreadable"),
        IntakeError::InvalidContent => (StatusCode::BAD_REQUEST, "invalid_qr_content"),
        IntakeError::DuplicateContent => (StatusCode::BAD_REQUEST, "duplicate_qr_code"),
        IntakeError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
        IntakeError::Store(_) | IntakeError::Io(_) | IntakeError::Internal(_) => {
            tracing::error!("Registration failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    error_response(status, error, err.to_string())
}

/// Caller network identity used for quota accounting
///
/// Honors `Forwarded`/`X-Forwarded-For`, falls back to the peer address,
/// and drops any port.
fn client_origin(req: &HttpRequest) -> String {
    let info = req.connection_info();
    let raw = info.realip_remote_addr().unwrap_or("unknown");
    raw.parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Health check endpoint
async fn health_check<S: ParticipantStore>(state: web::Data<AppState<S>>) -> impl Responder {
    let healthy = state.engine.store().health_check().await.unwrap_or(false);

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Register endpoint
///
/// POST /api/register
///
/// Request body:
/// ```json
/// {
///   "type": "team|person",
///   "score": 1500,
///   "match_mode": "exact|fuzzy",
///   "qrcode_image": "data:image/png;base64,..."
/// }
/// ```
async fn register<S: ParticipantStore>(
    state: web::Data<AppState<S>>,
    req: web::Json<RegisterRequest>,
    http_req: HttpRequest,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "validation_failed", errors.to_string());
    }

    let req = req.into_inner();
    let submission = Submission {
        kind: req.kind,
        score: req.score,
        mode: req.match_mode,
        image_data_url: req.qrcode_image,
        origin: client_origin(&http_req),
    };

    match state.gateway.submit(submission).await {
        Ok(receipt) => HttpResponse::Ok().json(RegisterResponse {
            uuid: receipt.id,
            status: receipt.outcome.status(),
            match_info: receipt.outcome.match_info().cloned(),
        }),
        Err(e) => intake_error_response(&e),
    }
}

/// Status endpoint
///
/// GET /api/status/{uuid}
///
/// Goes through a full matching attempt so a poll can complete a match that
/// became possible after this participant registered. If the store cannot
/// run the attempt, the read-only status is reported instead.
async fn get_status<S: ParticipantStore>(
    state: web::Data<AppState<S>>,
    path: web::Path<String>,
) -> impl Responder {
    let raw = path.into_inner();
    let id = match raw.parse::<ParticipantId>() {
        Ok(id) => id,
        Err(_) => {
            return error_response(StatusCode::NOT_FOUND, "not_found", format!("Unknown participant {}", raw));
        }
    };

    match state.engine.attempt(&id).await {
        Ok(outcome) => HttpResponse::Ok().json(StatusResponse {
            status: outcome.status(),
            match_info: outcome.match_info().cloned(),
        }),
        Err(MatchError::StoreUnavailable(e)) => {
            tracing::warn!("Matching attempt for {} failed, reading status only: {}", id, e);
            match state.engine.status(&id).await {
                Ok(report) => HttpResponse::Ok().json(StatusResponse {
                    status: report.status(),
                    match_info: report.match_info().cloned(),
                }),
                Err(e) => match_error_response(&id, &e),
            }
        }
        Err(e) => match_error_response(&id, &e),
    }
}

fn match_error_response(requested: &ParticipantId, err: &MatchError) -> HttpResponse {
    match err {
        MatchError::NotFound(missing) if missing == requested => {
            error_response(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        MatchError::NotFound(missing) => {
            tracing::error!("Participant {} is matched to missing partner {}", requested, missing);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
        MatchError::StoreUnavailable(e) if e.is_retryable() => {
            tracing::error!("Status read for {} failed: {}", requested, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string())
        }
        MatchError::StoreUnavailable(e) => {
            tracing::error!("Status read for {} hit a store fault: {}", requested, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

/// Current score rules
///
/// GET /api/config
async fn get_config<S: ParticipantStore>(state: web::Data<AppState<S>>) -> impl Responder {
    match MatchSettings::read(state.config.as_ref()).await {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => {
            tracing::error!("Failed to read runtime configuration: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::StoreError;
    use actix_web::test::TestRequest;

    #[test]
    fn test_client_origin_strips_port() {
        let req = TestRequest::default()
            .peer_addr("203.0.113.7:51234".parse().unwrap())
            .to_http_request();
        assert_eq!(client_origin(&req), "203.0.113.7");
    }

    #[test]
    fn test_client_origin_prefers_forwarded_for() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "198.51.100.2"))
            .peer_addr("203.0.113.7:51234".parse().unwrap())
            .to_http_request();
        assert_eq!(client_origin(&req), "198.51.100.2");
    }

    #[test]
    fn test_quota_maps_to_too_many_requests() {
        let resp = intake_error_response(&IntakeError::QuotaExceeded { limit: 3 });
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = intake_error_response(&IntakeError::DuplicateContent);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_match_error_mapping() {
        let requested = ParticipantId::generate();
        let partner = ParticipantId::generate();

        let resp = match_error_response(&requested, &MatchError::NotFound(requested.clone()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = match_error_response(&requested, &MatchError::NotFound(partner));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let unavailable = StoreError::Unavailable("lock timeout".to_string());
        let resp = match_error_response(&requested, &MatchError::StoreUnavailable(unavailable));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let corrupt = StoreError::Corrupt("bad row".to_string());
        let resp = match_error_response(&requested, &MatchError::StoreUnavailable(corrupt));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
