use std::path::Path;

use crate::models::ParticipantId;

/// URL prefix under which stored images are served
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Create the upload directory if needed
pub async fn ensure_dir(upload_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(upload_dir).await
}

/// Write an uploaded QR image as `<upload_dir>/<id>.<extension>`
///
/// Returns the public path the image is served under.
pub async fn save_image(
    upload_dir: &Path,
    id: &ParticipantId,
    extension: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    ensure_dir(upload_dir).await?;

    let filename = format!("{}.{}", id, extension);
    tokio::fs::write(upload_dir.join(&filename), bytes).await?;

    tracing::debug!("Stored {} bytes as {}", bytes.len(), filename);
    Ok(format!("{}/{}", PUBLIC_PREFIX, filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_image_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("uploads");
        let id = ParticipantId::generate();

        let public = save_image(&nested, &id, "png", b"png bytes").await.unwrap();

        assert_eq!(public, format!("/uploads/{}.png", id));
        let stored = std::fs::read(nested.join(format!("{}.png", id))).unwrap();
        assert_eq!(stored, b"png bytes");
    }

    #[tokio::test]
    async fn test_ensure_dir_fails_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, b"x").unwrap();

        assert!(ensure_dir(&file).await.is_err());
        assert!(ensure_dir(&dir.path().join("fresh")).await.is_ok());
    }
}
