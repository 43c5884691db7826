//! Validation policy predicates evaluated when an upload is finalized.
//!
//! The pipeline is ordered and short-circuiting:
//! 1. name sanitization (never fails)
//! 2. extension allow-list
//! 3. MIME allow-list, sniffed from the bytes
//! 4. assembled size
//! 5. structural image validation for `image/*` content

use crate::config::PolicyConfig;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Content type reported when the bytes match no known signature.
pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// Stem used when sanitization leaves nothing behind.
const FALLBACK_STEM: &str = "upload";

/// A policy violation. Every variant is terminal for the session.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("upload size {size} exceeds maximum {max} bytes")]
    SizeExceeded { size: u64, max: u64 },

    #[error("file extension {extension:?} is not allowed")]
    DisallowedExtension { extension: String },

    #[error("content type {mime} is not allowed")]
    DisallowedMimeType { mime: String },

    #[error("malformed image: {reason}")]
    MalformedImage { reason: String },
}

/// A client file name reduced to safe characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedName {
    /// Base name without extension; never empty.
    pub stem: String,
    /// Lower-cased extension without the dot; empty if there was none.
    pub extension: String,
}

/// Outcome of a successful pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub name: SanitizedName,
    pub mime: String,
    /// Width and height for image content.
    pub dimensions: Option<(u32, u32)>,
}

/// Reduce a declared file name to its last path component and `[A-Za-z0-9._-]`.
///
/// Directory separators and traversal segments are removed, not escaped.
pub fn sanitize_name(declared: &str, max_stem_len: usize) -> SanitizedName {
    let last = declared.rsplit(['/', '\\']).next().unwrap_or_default();
    let filtered: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let (stem, extension) = match filtered.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext.to_ascii_lowercase()),
        None => (filtered.as_str(), String::new()),
    };

    let stem: String = stem
        .trim_start_matches('.')
        .chars()
        .take(max_stem_len)
        .collect();
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };

    SanitizedName { stem, extension }
}

/// Check the sanitized extension against the allow-list.
pub fn check_extension(name: &SanitizedName, policy: &PolicyConfig) -> Result<(), Violation> {
    if policy.allows_extension(&name.extension) {
        Ok(())
    } else {
        Err(Violation::DisallowedExtension {
            extension: name.extension.clone(),
        })
    }
}

/// Determine the content type from magic bytes, ignoring any client label.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    infer::get(data)
        .map(|kind| kind.mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

/// Sniff the content type and check it against the allow-list.
pub fn check_mime(data: &[u8], policy: &PolicyConfig) -> Result<String, Violation> {
    let mime = sniff_mime(data);
    if policy.allows_mime(mime) {
        Ok(mime.to_string())
    } else {
        Err(Violation::DisallowedMimeType {
            mime: mime.to_string(),
        })
    }
}

/// Check an assembled size against the configured maximum.
pub fn check_size(size: u64, policy: &PolicyConfig) -> Result<(), Violation> {
    if size > policy.max_size {
        Err(Violation::SizeExceeded {
            size,
            max: policy.max_size,
        })
    } else {
        Ok(())
    }
}

/// Decode `image/*` content to prove it is a structurally valid image of the
/// sniffed type. Non-image content passes with `None`.
pub fn check_image(
    data: &[u8],
    mime: &str,
    policy: &PolicyConfig,
) -> Result<Option<(u32, u32)>, Violation> {
    if !mime.starts_with("image/") {
        return Ok(None);
    }

    let malformed = |reason: String| Violation::MalformedImage { reason };

    let format = image::ImageFormat::from_mime_type(mime)
        .ok_or_else(|| malformed(format!("no decoder available for {mime}")))?;

    // Header first so oversized images are refused before allocating pixels.
    let (width, height) = image::ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| malformed(format!("unreadable header: {e}")))?;

    if width == 0 || height == 0 {
        return Err(malformed(format!("invalid dimensions {width}x{height}")));
    }
    if width > policy.max_image_dimension || height > policy.max_image_dimension {
        return Err(malformed(format!(
            "dimensions {width}x{height} exceed maximum {}",
            policy.max_image_dimension
        )));
    }

    image::load_from_memory_with_format(data, format)
        .map_err(|e| malformed(format!("decode failed: {e}")))?;

    Ok(Some((width, height)))
}

/// Run the full pipeline against an assembled artifact.
pub fn evaluate(
    declared_name: &str,
    data: &[u8],
    policy: &PolicyConfig,
) -> Result<Verdict, Violation> {
    let name = sanitize_name(declared_name, policy.max_base_name_len);
    check_extension(&name, policy)?;
    let mime = check_mime(data, policy)?;
    check_size(data.len() as u64, policy)?;
    let dimensions = check_image(data, &mime, policy)?;
    Ok(Verdict {
        name,
        mime,
        dimensions,
    })
}
