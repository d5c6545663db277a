//! `data:<mime>;base64,<payload>` codec used for every embedded image handle.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::ImageHandle;
use crate::error::LookError;

pub const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Builds a data URL from raw bytes.
pub fn format(mime: &str, bytes: &[u8]) -> String {
    format_encoded(mime, &BASE64.encode(bytes))
}

/// Builds a data URL from an already base64-encoded payload.
pub fn format_encoded(mime: &str, payload: &str) -> String {
    format!("{DATA_URL_PREFIX}{mime}{BASE64_MARKER}{payload}")
}

pub fn encode(bytes: &[u8], mime: &str) -> ImageHandle {
    ImageHandle::from_validated(format(mime, bytes))
}

/// Splits a data URL into `(mime, base64 payload)` without decoding.
///
/// The payload never contains `;`, so the last `;base64,` marker is the
/// separator even when the MIME carries parameters.
pub fn split(url: &str) -> Result<(&str, &str), LookError> {
    let Some(rest) = url.strip_prefix(DATA_URL_PREFIX) else {
        return Err(LookError::MalformedHandle(
            "missing `data:` prefix".to_string(),
        ));
    };
    let Some((mime, payload)) = rest.rsplit_once(BASE64_MARKER) else {
        return Err(LookError::MalformedHandle(
            "missing `;base64,` marker".to_string(),
        ));
    };
    if mime.trim().is_empty() {
        return Err(LookError::MalformedHandle("empty mime type".to_string()));
    }
    Ok((mime, payload))
}

pub fn decode_str(url: &str) -> Result<(String, Vec<u8>), LookError> {
    let (mime, payload) = split(url)?;
    let bytes = BASE64
        .decode(payload.as_bytes())
        .map_err(|err| LookError::MalformedHandle(format!("invalid base64 payload: {err}")))?;
    Ok((mime.to_string(), bytes))
}

pub fn decode(handle: &ImageHandle) -> Result<(String, Vec<u8>), LookError> {
    match handle {
        ImageHandle::Embedded(url) => decode_str(url),
        ImageHandle::Referenced { path, .. } => Err(LookError::MalformedHandle(format!(
            "referenced handle {} must be embedded before decoding",
            path.display()
        ))),
    }
}
