pub mod data_url;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;

use crate::error::LookError;

/// MIME types accepted by the analysis and generative oracles.
pub const SUPPORTED_IMAGE_MIME: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Reference to image content plus its MIME type.
///
/// Embedded handles share one immutable data URL, so cloning is cheap and a
/// reader never observes a half-written image: state changes replace the
/// whole handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageHandle {
    Embedded(Arc<str>),
    Referenced { path: PathBuf, mime: String },
}

impl ImageHandle {
    pub(crate) fn from_validated(url: String) -> Self {
        Self::Embedded(Arc::from(url))
    }

    pub fn from_data_url(url: impl Into<String>) -> Result<Self, LookError> {
        let url = url.into();
        data_url::split(&url)?;
        Ok(Self::from_validated(url))
    }

    /// Accepts a data URL or a bare base64 payload, which is assumed JPEG.
    pub fn parse(raw: &str) -> Result<Self, LookError> {
        let trimmed = raw.trim();
        if trimmed.starts_with(data_url::DATA_URL_PREFIX) {
            return Self::from_data_url(trimmed);
        }
        if trimmed.is_empty() {
            return Err(LookError::MalformedHandle("empty image source".to_string()));
        }
        Self::from_data_url(data_url::format_encoded("image/jpeg", trimmed))
    }

    /// Points at a file, labelled by its leading bytes. The extension is
    /// only used when the content is unreadable or unrecognised.
    pub fn referenced(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime = sniff_file(&path)
            .unwrap_or_else(|| mime_for_path(&path))
            .to_string();
        Self::Referenced { path, mime }
    }

    /// Embeds raw bytes, labelling them with the MIME sniffed from content.
    pub fn embed_bytes(bytes: &[u8], fallback_mime: &str) -> Self {
        let mime = sniff_mime(bytes).unwrap_or(fallback_mime);
        data_url::encode(bytes, mime)
    }

    pub fn mime(&self) -> &str {
        match self {
            Self::Embedded(url) => data_url::split(url)
                .map(|(mime, _)| mime)
                .unwrap_or("application/octet-stream"),
            Self::Referenced { mime, .. } => mime.as_str(),
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    pub fn as_data_url(&self) -> Option<&str> {
        match self {
            Self::Embedded(url) => Some(url.as_ref()),
            Self::Referenced { .. } => None,
        }
    }

    /// Raw bytes behind the handle, reading the file for referenced handles.
    pub fn read_bytes(&self) -> Result<Vec<u8>, LookError> {
        match self {
            Self::Embedded(_) => data_url::decode(self).map(|(_, bytes)| bytes),
            Self::Referenced { path, .. } => std::fs::read(path)
                .map_err(|err| LookError::Io(format!("failed reading {}: {err}", path.display()))),
        }
    }

    pub fn materialize(&self) -> Result<Self, LookError> {
        match self {
            Self::Embedded(_) => Ok(self.clone()),
            Self::Referenced { mime, .. } => Ok(Self::embed_bytes(&self.read_bytes()?, mime)),
        }
    }
}

pub fn is_supported_mime(mime: &str) -> bool {
    let lowered = mime.trim().to_ascii_lowercase();
    SUPPORTED_IMAGE_MIME.iter().any(|value| *value == lowered)
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

fn sniff_file(path: &Path) -> Option<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)
        .ok()?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .ok()?;
    sniff_mime(&head)
}

const SNIFF_LEN: usize = 64;

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}
