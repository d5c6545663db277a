use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use looklab_contracts::images::{data_url, ImageHandle};
use looklab_contracts::LookError;
use tracing::{debug, instrument};

pub const BLEND_MIME: &str = "image/jpeg";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Mixes the max-strength look back over the original at a user intensity.
#[derive(Debug, Clone, Copy)]
pub struct Blender {
    jpeg_quality: u8,
}

impl Default for Blender {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Blender {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// `0` and `100` hand back the inputs untouched; anything between is
    /// composited at the original's size and re-encoded as JPEG.
    #[instrument(skip(self, original, stylized))]
    pub async fn blend(
        &self,
        original: &ImageHandle,
        stylized: &ImageHandle,
        intensity: u8,
    ) -> Result<ImageHandle, LookError> {
        if intensity >= 100 {
            return Ok(stylized.clone());
        }
        if intensity == 0 {
            return Ok(original.clone());
        }

        let (base, overlay) = tokio::try_join!(
            decode_in_background(original.clone(), "original"),
            decode_in_background(stylized.clone(), "stylized"),
        )?;

        let quality = self.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || {
            let canvas = composite(&base, &overlay, intensity);
            encode_jpeg(&canvas, quality)
        })
        .await
        .map_err(|err| LookError::DecodeFailed(format!("blend task failed: {err}")))??;

        debug!(bytes = encoded.len(), "blend encoded");
        Ok(data_url::encode(&encoded, BLEND_MIME))
    }
}

async fn decode_in_background(
    handle: ImageHandle,
    role: &'static str,
) -> Result<RgbImage, LookError> {
    tokio::task::spawn_blocking(move || decode_rgb(&handle, role))
        .await
        .map_err(|err| LookError::DecodeFailed(format!("{role} decode task failed: {err}")))?
}

fn decode_rgb(handle: &ImageHandle, role: &str) -> Result<RgbImage, LookError> {
    let bytes = handle
        .read_bytes()
        .map_err(|err| LookError::DecodeFailed(format!("{role}: {err}")))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| LookError::DecodeFailed(format!("{role}: {err}")))?;
    Ok(decoded.to_rgb8())
}

/// `out = base * (1 - a) + overlay * a` with `a = intensity / 100`.
///
/// The overlay is resampled to the base dimensions when they differ.
pub fn composite(base: &RgbImage, overlay: &RgbImage, intensity: u8) -> RgbImage {
    let (width, height) = base.dimensions();
    let resized;
    let overlay = if overlay.dimensions() == (width, height) {
        overlay
    } else {
        resized = imageops::resize(overlay, width, height, FilterType::Triangle);
        &resized
    };

    let alpha = f32::from(intensity.min(100)) / 100.0;
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let Rgb(low) = *base.get_pixel(x, y);
        let Rgb(high) = *overlay.get_pixel(x, y);
        let mut mixed = [0u8; 3];
        for channel in 0..3 {
            let value = f32::from(low[channel]) * (1.0 - alpha) + f32::from(high[channel]) * alpha;
            mixed[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(mixed);
    }
    out
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, LookError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(canvas)
        .map_err(|err| LookError::DecodeFailed(format!("jpeg encode failed: {err}")))?;
    Ok(out.into_inner())
}
