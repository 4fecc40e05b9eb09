//! Submission gateway
//!
//! Validates an inbound registration, enforces the per-origin daily quota,
//! decodes the QR image into a content key, rejects duplicates, persists
//! the participant and its image, and finally hands the new participant to
//! the matching engine.

use chrono::{DateTime, Duration, Local, Utc};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::MatchingEngine;
use crate::models::{Kind, MatchOutcome, MatchSettings, Mode, NewParticipant, ParticipantId};
use crate::services::artifacts;
use crate::services::qrcode::{DataUrlImage, QrDecoder, QrError};
use crate::services::runtime_config::{keys, ConfigProvider, DEFAULT_MAX_PER_DAY, DEFAULT_UPLOAD_DIR};
use crate::services::store::{ParticipantStore, StoreError};

/// Longest content key the participant table accepts
pub const MAX_CONTENT_KEY_LEN: usize = 200;

/// Errors that reject a submission
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Only PNG, JPG and GIF images are supported")]
    UnsupportedImageType,

    #[error("Image data exceeds {limit} bytes")]
    ImageTooLarge { limit: usize },

    #[error("Score {score} is outside 0..={max}")]
    ScoreOutOfRange { score: i32, max: i32 },

    #[error("Daily submission limit of {limit} reached")]
    QuotaExceeded { limit: i64 },

    #[error("Invalid image: {0}")]
    InvalidImage(QrError),

    #[error("QR code unreadable: {0}")]
    QrUnreadable(QrError),

    #[error("QR code content is not a valid invitation")]
    InvalidContent,

    #[error("This QR code has already been submitted")]
    DuplicateContent,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to save image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<QrError> for IntakeError {
    fn from(err: QrError) -> Self {
        match err {
            QrError::Base64(_) | QrError::Image(_) => IntakeError::InvalidImage(err),
            QrError::NotFound | QrError::Decode(_) => IntakeError::QrUnreadable(err),
        }
    }
}

/// A registration as received from a caller
#[derive(Debug, Clone)]
pub struct Submission {
    pub kind: Kind,
    pub score: i32,
    pub mode: Mode,
    /// `data:image/<type>;base64,<payload>`
    pub image_data_url: String,
    pub origin: String,
}

/// What the caller gets back after a successful registration
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub id: ParticipantId,
    pub outcome: MatchOutcome,
}

/// Start of the current local calendar day, the quota window boundary
pub fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) - Duration::hours(24))
}

pub struct SubmissionGateway<S: ParticipantStore> {
    engine: MatchingEngine<S>,
    config: Arc<dyn ConfigProvider>,
    decoder: Arc<dyn QrDecoder>,
    max_image_bytes: usize,
}

impl<S: ParticipantStore> SubmissionGateway<S> {
    pub fn new(
        engine: MatchingEngine<S>,
        config: Arc<dyn ConfigProvider>,
        decoder: Arc<dyn QrDecoder>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            engine,
            config,
            decoder,
            max_image_bytes,
        }
    }

    /// Register a participant and make its first matching attempt
    ///
    /// A failing matching attempt does not fail the registration: the
    /// participant stays pending and a later status poll retries.
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionReceipt, IntakeError> {
        let store = self.engine.store();

        if submission.image_data_url.len() > self.max_image_bytes {
            return Err(IntakeError::ImageTooLarge { limit: self.max_image_bytes });
        }
        let image = DataUrlImage::parse(&submission.image_data_url)
            .ok_or(IntakeError::UnsupportedImageType)?;

        let settings = MatchSettings::read(self.config.as_ref()).await?;
        if submission.score < 0 || submission.score > settings.target_score {
            return Err(IntakeError::ScoreOutOfRange {
                score: submission.score,
                max: settings.target_score,
            });
        }

        let limit = self
            .config
            .get_int(keys::MAX_PER_DAY_IP, DEFAULT_MAX_PER_DAY)
            .await?;
        let used = store
            .count_submissions_since(&submission.origin, start_of_local_day(Local::now()))
            .await?;
        if used as i64 >= limit {
            info!("Quota reached for {} ({} of {})", submission.origin, used, limit);
            return Err(IntakeError::QuotaExceeded { limit });
        }

        let bytes = image.bytes()?;
        let decoder = self.decoder.clone();
        let (bytes, decoded) = tokio::task::spawn_blocking(move || {
            let decoded = decoder.decode(&bytes);
            (bytes, decoded)
        })
        .await
        .map_err(|e| IntakeError::Internal(format!("QR decoding task failed: {}", e)))?;
        let content = decoded?;

        let prefix = self
            .config
            .get_value(keys::VALID_URL_PREFIX)
            .await?
            .unwrap_or_default();
        if content.is_empty()
            || content.len() > MAX_CONTENT_KEY_LEN
            || !content.starts_with(&prefix)
        {
            return Err(IntakeError::InvalidContent);
        }

        if store.content_key_exists(&content).await? {
            return Err(IntakeError::DuplicateContent);
        }

        // Upload directory must be usable before the row is created
        let upload_dir = self
            .config
            .get_value(keys::UPLOAD_DIR)
            .await?
            .filter(|dir| !dir.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string());
        artifacts::ensure_dir(Path::new(&upload_dir)).await?;

        let participant = match store
            .create_participant(NewParticipant {
                kind: submission.kind,
                score: submission.score,
                mode: submission.mode,
                content_key: content,
                origin: submission.origin.clone(),
            })
            .await
        {
            Ok(p) => p,
            Err(StoreError::DuplicateContentKey(_)) => return Err(IntakeError::DuplicateContent),
            Err(e) => return Err(e.into()),
        };

        let public_path =
            artifacts::save_image(Path::new(&upload_dir), &participant.id, image.extension, &bytes)
                .await
                .map_err(|e| {
                    error!("Participant {} registered without its image: {}", participant.id, e);
                    e
                })?;
        store.set_artifact_path(&participant.id, &public_path).await?;

        info!(
            "Registered participant {} ({:?}, {:?}, score {}) from {}",
            participant.id, participant.kind, participant.mode, participant.score, submission.origin
        );

        let outcome = match self.engine.attempt(&participant.id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Matching attempt for new participant {} failed, leaving it pending: {}",
                    participant.id, e
                );
                MatchOutcome::NoCandidate
            }
        };

        Ok(SubmissionReceipt {
            id: participant.id,
            outcome,
        })
    }
}
