use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::gemini::InlineData;

/// Splits a `data:<mime>;base64,<payload>` URI into the inline form the
/// image model accepts.
pub fn parse_data_uri(uri: &str) -> Option<InlineData> {
    let rest = uri.trim().strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    if mime_type.is_empty() || data.is_empty() {
        return None;
    }
    Some(InlineData {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

/// Decodes a bare base64 payload or the payload of a data URI.
pub fn decode_base64_image(s: &str) -> Result<Vec<u8>> {
    let data = match s.find(',') {
        Some(idx) => &s[(idx + 1)..],
        None => s,
    };
    B64.decode(data.trim()).map_err(|e| anyhow!("base64 decode: {e}"))
}

pub fn guess_image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return "png";
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "jpg";
    }
    // RIFF....WEBP
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "webp";
    }
    "png"
}

/// Writes a generated image under `<data_dir>/images/<session_id>/` and
/// returns the file path. The extension follows the decoded bytes.
pub async fn save_image_to_disk(
    data_dir: &Path,
    data_uri: &str,
    session_id: &str,
    stem: &str,
) -> Result<PathBuf> {
    let bytes = decode_base64_image(data_uri)?;
    let img_dir = data_dir.join("images").join(session_id);
    tokio::fs::create_dir_all(&img_dir)
        .await
        .context("create image dir")?;
    let file_path = img_dir.join(format!("{stem}.{}", guess_image_extension(&bytes)));
    tokio::fs::write(&file_path, &bytes)
        .await
        .with_context(|| format!("write {}", file_path.display()))?;
    info!(path = %file_path.display(), bytes = bytes.len(), "saved generated image");
    Ok(file_path)
}
