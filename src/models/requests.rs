use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::models::domain::{Kind, Mode};

/// Request to register a participant
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(rename = "type")]
    pub kind: Kind,
    #[validate(range(min = 0))]
    pub score: i32,
    pub match_mode: Mode,
    /// Data URL of the QR code image, e.g. `data:image/png;base64,...`
    #[validate(length(min = 1))]
    pub qrcode_image: String,
}
