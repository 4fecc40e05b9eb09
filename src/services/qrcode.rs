use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Accepted data URL headers and the file extension each one is stored under
const SUPPORTED_IMAGE_HEADERS: [(&str, &str); 4] = [
    ("data:image/png;base64,", "png"),
    ("data:image/jpeg;base64,", "jpg"),
    ("data:image/jpg;base64,", "jpg"),
    ("data:image/gif;base64,", "gif"),
];

/// Errors that can occur while reading a QR code image
#[derive(Debug, Error)]
pub enum QrError {
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("No QR code found in image")]
    NotFound,

    #[error("Cannot read QR code: {0}")]
    Decode(String),
}

/// An uploaded image split into its declared type and base64 payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrlImage<'a> {
    pub extension: &'static str,
    pub payload: &'a str,
}

impl<'a> DataUrlImage<'a> {
    /// Parse a `data:image/...;base64,` URL of a supported image type
    pub fn parse(data_url: &'a str) -> Option<Self> {
        SUPPORTED_IMAGE_HEADERS
            .iter()
            .find_map(|(header, extension)| {
                data_url.strip_prefix(*header).map(|payload| Self {
                    extension: *extension,
                    payload,
                })
            })
    }

    pub fn bytes(&self) -> Result<Vec<u8>, QrError> {
        Ok(STANDARD.decode(self.payload)?)
    }
}

/// Extracts the text content of a QR code from encoded image bytes
pub trait QrDecoder: Send + Sync {
    fn decode(&self, image_bytes: &[u8]) -> Result<String, QrError>;
}

/// Decoder built on `image` for pixel decoding and `rqrr` for QR detection
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image_bytes: &[u8]) -> Result<String, QrError> {
        let img = image::load_from_memory(image_bytes)?.to_luma8();

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            img.width() as usize,
            img.height() as usize,
            |x, y| img.get_pixel(x as u32, y as u32).0[0],
        );

        let grids = prepared.detect_grids();
        let content = first_decoded(
            grids
                .iter()
                .map(|grid| grid.decode().map(|(_meta, content)| content)),
        )?;

        tracing::debug!("QR content decoded from one of {} grids: {}", grids.len(), content);
        Ok(content)
    }
}

/// First successful grid decode, stopping as soon as one succeeds
///
/// Reports the last decode failure when every grid fails, and
/// [`QrError::NotFound`] when there were no grids at all.
fn first_decoded<I, E>(attempts: I) -> Result<String, QrError>
where
    I: IntoIterator<Item = Result<String, E>>,
    E: std::fmt::Debug,
{
    let mut last_error = QrError::NotFound;
    for attempt in attempts {
        match attempt {
            Ok(content) => return Ok(content),
            Err(e) => last_error = QrError::Decode(format!("{:?}", e)),
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn blank_png() -> Vec<u8> {
        let img = GrayImage::from_pixel(64, 64, Luma([255u8]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_parse_supported_headers() {
        let png = DataUrlImage::parse("data:image/png;base64,AAAA").unwrap();
        assert_eq!(png.extension, "png");
        assert_eq!(png.payload, "AAAA");

        assert_eq!(DataUrlImage::parse("data:image/jpeg;base64,x").unwrap().extension, "jpg");
        assert_eq!(DataUrlImage::parse("data:image/jpg;base64,x").unwrap().extension, "jpg");
        assert_eq!(DataUrlImage::parse("data:image/gif;base64,x").unwrap().extension, "gif");
    }

    #[test]
    fn test_parse_rejects_other_types() {
        assert!(DataUrlImage::parse("data:image/webp;base64,AAAA").is_none());
        assert!(DataUrlImage::parse("data:text/plain;base64,AAAA").is_none());
        assert!(DataUrlImage::parse("AAAA").is_none());
    }

    #[test]
    fn test_invalid_base64_reported() {
        let image = DataUrlImage::parse("data:image/png;base64,not base64!").unwrap();
        assert!(matches!(image.bytes(), Err(QrError::Base64(_))));
    }

    #[test]
    fn test_garbage_bytes_are_not_an_image() {
        let result = RqrrDecoder.decode(b"definitely not an image");
        assert!(matches!(result, Err(QrError::Image(_))));
    }

    #[test]
    fn test_later_grid_used_when_first_fails() {
        let attempts = vec![Err("bad format"), Ok("https://u.alipay.cn/x".to_string())];
        assert_eq!(first_decoded(attempts).unwrap(), "https://u.alipay.cn/x");
    }

    #[test]
    fn test_grid_decoding_stops_at_first_success() {
        let mut tried = 0;
        let attempts = ["first", "second", "third"].iter().map(|text| {
            tried += 1;
            Ok::<_, ()>(text.to_string())
        });
        assert_eq!(first_decoded(attempts).unwrap(), "first");
        assert_eq!(tried, 1);
    }

    #[test]
    fn test_all_grids_failing_reports_decode_error() {
        let attempts: Vec<Result<String, &str>> = vec![Err("ecc"), Err("format")];
        assert!(matches!(first_decoded(attempts), Err(QrError::Decode(msg)) if msg.contains("format")));

        let none: Vec<Result<String, &str>> = Vec::new();
        assert!(matches!(first_decoded(none), Err(QrError::NotFound)));
    }

    #[test]
    fn test_blank_image_has_no_qr_code() {
        let result = RqrrDecoder.decode(&blank_png());
        assert!(matches!(result, Err(QrError::NotFound)));
    }
}
