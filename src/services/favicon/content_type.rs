//! Content-type acceptance for icon payloads

use crate::errors::{FaviconError, FaviconResult};

const OCTET_STREAM: &str = "application/octet-stream";
const SVG_MIME: &str = "image/svg+xml";
const SVG_SNIFF_WINDOW: usize = 1024;

/// Decide the content type to store for an icon payload.
///
/// Declared `image/*` types, and anything mentioning `icon` or `svg`, are
/// taken as-is. A missing or `application/octet-stream` type is only
/// accepted when the bytes themselves look like an image.
pub fn accept_content_type(declared: Option<&str>, body: &[u8]) -> FaviconResult<String> {
    let declared = declared.map(essence).filter(|ct| !ct.is_empty());

    match declared.as_deref() {
        Some(ct) if ct != OCTET_STREAM => {
            if ct.starts_with("image/") || ct.contains("icon") || ct.contains("svg") {
                Ok(ct.to_string())
            } else {
                Err(FaviconError::unsupported_content_type(ct))
            }
        }
        _ => sniff(body).ok_or_else(|| {
            FaviconError::unsupported_content_type(declared.clone().unwrap_or_else(|| "unknown".into()))
        }),
    }
}

/// Lowercased media type without parameters
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn sniff(body: &[u8]) -> Option<String> {
    if let Some(kind) = infer::get(body)
        && kind.matcher_type() == infer::MatcherType::Image
    {
        return Some(kind.mime_type().to_string());
    }
    looks_like_svg(body).then(|| SVG_MIME.to_string())
}

fn looks_like_svg(body: &[u8]) -> bool {
    let window = &body[..body.len().min(SVG_SNIFF_WINDOW)];
    String::from_utf8_lossy(window)
        .to_ascii_lowercase()
        .contains("<svg")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_declared_image_types_are_accepted() {
        assert_eq!(accept_content_type(Some("image/png"), b"x").unwrap(), "image/png");
        assert_eq!(
            accept_content_type(Some("Image/X-Icon; charset=binary"), b"x").unwrap(),
            "image/x-icon"
        );
        assert_eq!(
            accept_content_type(Some("application/ico"), b"x").unwrap(),
            "application/ico"
        );
        assert_eq!(
            accept_content_type(Some("text/svg"), b"x").unwrap(),
            "text/svg"
        );
    }

    #[test]
    fn test_non_image_types_are_rejected() {
        let err = accept_content_type(Some("text/html"), PNG).unwrap_err();
        assert!(matches!(err, FaviconError::UnsupportedContentType { .. }));
        assert!(accept_content_type(Some("application/json"), b"{}").is_err());
    }

    #[test]
    fn test_ambiguous_types_are_sniffed() {
        assert_eq!(accept_content_type(None, PNG).unwrap(), "image/png");
        assert_eq!(
            accept_content_type(Some("application/octet-stream"), PNG).unwrap(),
            "image/png"
        );
        assert_eq!(
            accept_content_type(None, br#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"/>"#)
                .unwrap(),
            SVG_MIME
        );
        assert!(accept_content_type(None, b"<html><body>hi</body></html>").is_err());
        assert!(accept_content_type(Some(""), b"plain text").is_err());
    }
}
