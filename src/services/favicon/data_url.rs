//! `data:` URI decoding for inline icons

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use super::content_type::accept_content_type;
use crate::errors::{FaviconError, FaviconResult};
use crate::models::FaviconAsset;

/// Standard alphabet that tolerates missing or present padding
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn is_data_url(href: &str) -> bool {
    href.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Decode `data:[<mediatype>][;base64],<payload>` into an icon asset.
///
/// The payload must be non-empty, no larger than `max_bytes`, and of an
/// acceptable image type.
pub fn decode_data_url(href: &str, max_bytes: usize) -> FaviconResult<FaviconAsset> {
    if !is_data_url(href) {
        return Err(FaviconError::invalid_data_url("missing data: scheme"));
    }
    let rest = &href[5..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| FaviconError::invalid_data_url("missing ',' separator"))?;

    let mut params = meta.split(';').map(str::trim);
    let media_type = params.next().filter(|mt| !mt.is_empty());
    let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        let unescaped = if payload.contains('%') {
            urlencoding::decode_binary(payload.as_bytes()).into_owned()
        } else {
            payload.as_bytes().to_vec()
        };
        let compact: Vec<u8> = unescaped
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        LENIENT_BASE64
            .decode(&compact)
            .map_err(|e| FaviconError::invalid_data_url(format!("invalid base64 payload: {e}")))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    if data.is_empty() {
        return Err(FaviconError::invalid_data_url("empty payload"));
    }
    if data.len() > max_bytes {
        return Err(FaviconError::PayloadTooLarge {
            url: "data:".to_string(),
            max_size: max_bytes,
        });
    }

    let content_type = accept_content_type(media_type, &data)?;
    Ok(FaviconAsset {
        data,
        content_type,
        source_url: href.to_string(),
    })
}
