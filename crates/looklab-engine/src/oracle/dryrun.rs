use std::io::Cursor;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb};
use looklab_contracts::grading::{LookMetrics, Preset};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{
    AnalysisOracle, AnalysisReply, AnalysisRequest, Candidate, InlineImage, LookOracle, LookReply,
    LookRequest, NamedOracle, OracleFailure, ReplyPart,
};

/// Offline oracle: metrics come from a content hash, looks from a preset tint.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunOracle;

impl NamedOracle for DryrunOracle {
    fn name(&self) -> &str {
        "dryrun"
    }
}

#[async_trait]
impl AnalysisOracle for DryrunOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReply, OracleFailure> {
        let bytes = decode_payload(&request.image)?;
        let digest = Sha256::digest(&bytes);
        let mut metrics = Map::new();
        for (idx, axis) in LookMetrics::AXES.iter().enumerate() {
            metrics.insert(axis.to_string(), Value::from(u64::from(digest[idx]) % 101));
        }
        let text = serde_json::to_string(&metrics)
            .map_err(|err| OracleFailure::InvalidPayload(err.to_string()))?;
        Ok(AnalysisReply { text })
    }
}

#[async_trait]
impl LookOracle for DryrunOracle {
    async fn transfer(&self, request: &LookRequest) -> Result<LookReply, OracleFailure> {
        let bytes = decode_payload(&request.target)?;
        let preset = request.preset;
        let rendered = tokio::task::spawn_blocking(move || render_tint(&bytes, preset))
            .await
            .map_err(|err| OracleFailure::Transport(format!("dryrun render task failed: {err}")))?;

        let candidate = match rendered {
            Ok(png) => Candidate {
                parts: vec![ReplyPart::InlineImage(InlineImage {
                    mime_type: "image/png".to_string(),
                    data: BASE64.encode(png),
                })],
                finish_reason: Some("STOP".to_string()),
            },
            Err(reason) => Candidate {
                parts: vec![ReplyPart::Text(reason)],
                finish_reason: Some("OTHER".to_string()),
            },
        };
        Ok(LookReply {
            candidates: vec![candidate],
            block_reason: None,
        })
    }
}

fn decode_payload(image: &InlineImage) -> Result<Vec<u8>, OracleFailure> {
    BASE64
        .decode(image.data.as_bytes())
        .map_err(|err| OracleFailure::InvalidPayload(format!("invalid base64 image: {err}")))
}

pub(crate) fn preset_tint(preset: Preset) -> [u8; 3] {
    match preset {
        Preset::Estate => [255, 190, 110],
        Preset::Dark => [30, 36, 60],
        Preset::Corporate => [110, 150, 205],
        Preset::Analog => [196, 164, 120],
    }
}

/// Full-strength tint: 60% preset colour over the source pixels.
fn render_tint(bytes: &[u8], preset: Preset) -> Result<Vec<u8>, String> {
    let source = image::load_from_memory(bytes)
        .map_err(|err| format!("target image could not be read: {err}"))?;
    let tint = preset_tint(preset);
    let mut canvas = source.to_rgb8();
    for pixel in canvas.pixels_mut() {
        let Rgb(channels) = *pixel;
        let mut out = [0u8; 3];
        for idx in 0..3 {
            let mixed = f32::from(channels[idx]) * 0.4 + f32::from(tint[idx]) * 0.6;
            out[idx] = mixed.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(out);
    }
    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|err| format!("png encode failed: {err}"))?;
    Ok(encoded.into_inner())
}
