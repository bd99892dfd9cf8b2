//! Attachment resolution
//!
//! Reads caller-supplied file references and turns them into attachments:
//! images (detected by magic bytes) become base64 payloads, UTF-8 files
//! become text. Anything else is rejected as unsupported.

use super::models::Attachment;
use crate::context::TokenEstimator;
use crate::error::{ChatError, Result};
use base64::Engine as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";
const WEBP_MAGIC: &[u8] = b"RIFF";
const BMP_MAGIC: &[u8] = b"BM";

/// Default upper bound on a single attachment: 10 MB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Detected content class of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedType {
    Image(&'static str),
    Text,
    Binary,
}

/// Detect an image MIME type from full file signatures.
///
/// Attachments are arbitrary files, so short prefixes that ordinary text can
/// start with ("GIF", "BM") are not enough on their own.
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    if bytes.starts_with(PNG_MAGIC) {
        Some("image/png")
    } else if bytes.starts_with(JPEG_MAGIC) {
        Some("image/jpeg")
    } else if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
        Some("image/gif")
    } else if bytes.len() >= 12 && bytes.starts_with(WEBP_MAGIC) && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if is_bmp(bytes) {
        Some("image/bmp")
    } else {
        None
    }
}

/// `BM`, a little-endian file size equal to the length, then four reserved zero bytes
fn is_bmp(bytes: &[u8]) -> bool {
    if bytes.len() < 14 || !bytes.starts_with(BMP_MAGIC) {
        return false;
    }
    let declared = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    declared as usize == bytes.len() && bytes[6..10].iter().all(|&b| b == 0)
}

pub fn detect_type(bytes: &[u8]) -> DetectedType {
    if let Some(mime) = detect_image_mime(bytes) {
        return DetectedType::Image(mime);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.contains('\0') => DetectedType::Text,
        _ => DetectedType::Binary,
    }
}

/// Resolves file references into attachments
pub struct AttachmentResolver {
    estimator: Arc<dyn TokenEstimator>,
    max_file_bytes: u64,
}

impl AttachmentResolver {
    pub fn new(estimator: Arc<dyn TokenEstimator>, max_file_bytes: u64) -> Self {
        Self {
            estimator,
            max_file_bytes,
        }
    }

    pub async fn resolve_all(&self, sources: &[String]) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::with_capacity(sources.len());
        for source in sources {
            attachments.push(self.resolve(source).await?);
        }
        Ok(attachments)
    }

    /// Resolve one reference: a local path, `~/`-relative path or `file://` URI
    pub async fn resolve(&self, source: &str) -> Result<Attachment> {
        let path = local_path(source)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ChatError::unsupported_attachment(source, format!("unreadable: {}", e)))?;
        if !metadata.is_file() {
            return Err(ChatError::unsupported_attachment(source, "not a regular file"));
        }
        if metadata.len() > self.max_file_bytes {
            return Err(ChatError::unsupported_attachment(
                source,
                format!(
                    "file is {} bytes, limit is {} bytes",
                    metadata.len(),
                    self.max_file_bytes
                ),
            ));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ChatError::unsupported_attachment(source, format!("unreadable: {}", e)))?;
        let raw_size = bytes.len() as u64;

        let attachment = match detect_type(&bytes) {
            DetectedType::Image(mime) => {
                let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                Attachment::image(source, mime, raw_size, data, self.estimator.as_ref())
            }
            DetectedType::Text => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    ChatError::unsupported_attachment(source, format!("invalid UTF-8: {}", e))
                })?;
                Attachment::text(source, "text/plain", raw_size, text, false, self.estimator.as_ref())
            }
            DetectedType::Binary => {
                return Err(ChatError::unsupported_attachment(
                    source,
                    "binary content is neither text nor a supported image",
                ));
            }
        };

        debug!(
            "Resolved attachment {} ({}, {} bytes, ~{} tokens)",
            source, attachment.media_type, raw_size, attachment.token_estimate
        );
        Ok(attachment)
    }
}

fn local_path(source: &str) -> Result<PathBuf> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(ChatError::unsupported_attachment(source, "empty path"));
    }
    let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    if path.contains("://") {
        return Err(ChatError::unsupported_attachment(
            source,
            "only local file paths are supported",
        ));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ChatError::unsupported_attachment(source, "home directory is not available")
        })?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(path))
}
