use std::sync::Arc;

use looklab_contracts::grading::LookMetrics;
use looklab_contracts::images::{is_supported_mime, ImageHandle};
use looklab_contracts::{ErrorKind, LookError};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::oracle::{classify_failure, AnalysisOracle, AnalysisRequest, CallSite, InlineImage};

pub const ANALYSIS_INSTRUCTION: &str = "Analyze the aesthetic qualities of this image for a \
professional photography color grading tool. Return a JSON object with integer values between \
0 and 100 for: contrast, saturation, warmth, uniformity, exposure.";

/// Turns a reference image into a five-axis [`LookMetrics`] via the oracle.
#[derive(Clone)]
pub struct Analyzer {
    oracle: Arc<dyn AnalysisOracle>,
    model: String,
}

impl Analyzer {
    pub fn new(oracle: Arc<dyn AnalysisOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, reference), fields(oracle = self.oracle.name(), model = %self.model))]
    pub async fn analyze(&self, reference: &ImageHandle) -> Result<LookMetrics, LookError> {
        let image = InlineImage::from_handle(reference).map_err(|err| match err.kind() {
            ErrorKind::MalformedHandle => LookError::InvalidInput(err.to_string()),
            _ => err,
        })?;
        if !is_supported_mime(&image.mime_type) {
            return Err(LookError::InvalidInput(format!(
                "unsupported reference image type '{}'",
                image.mime_type
            )));
        }

        let reply = self
            .oracle
            .analyze(&AnalysisRequest {
                model: self.model.clone(),
                image,
                instruction: ANALYSIS_INSTRUCTION.to_string(),
            })
            .await
            .map_err(|failure| classify_failure(failure, CallSite::Analysis))?;
        let metrics = parse_metrics(&reply.text)?;
        debug!(?metrics, "reference analyzed");
        Ok(metrics)
    }
}

/// Parses the oracle's JSON reply, tolerating a surrounding code fence.
pub fn parse_metrics(text: &str) -> Result<LookMetrics, LookError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(LookError::AnalysisMalformed("empty analysis reply".to_string()));
    }
    let parsed: Value = serde_json::from_str(body)
        .map_err(|err| LookError::AnalysisMalformed(format!("reply is not JSON: {err}")))?;
    let Some(object) = parsed.as_object() else {
        return Err(LookError::AnalysisMalformed(
            "reply is not a JSON object".to_string(),
        ));
    };

    let mut values = [0i64; 5];
    for (idx, axis) in LookMetrics::AXES.iter().enumerate() {
        let Some(raw) = object.get(*axis) else {
            return Err(LookError::AnalysisMalformed(format!("missing field '{axis}'")));
        };
        values[idx] = integer_value(raw).ok_or_else(|| {
            LookError::AnalysisMalformed(format!("field '{axis}' is not an integer: {raw}"))
        })?;
    }
    LookMetrics::from_axes(values).map_err(|err| LookError::AnalysisMalformed(err.to_string()))
}

fn integer_value(raw: &Value) -> Option<i64> {
    if let Some(value) = raw.as_i64() {
        return Some(value);
    }
    let float = raw.as_f64()?;
    (float.fract() == 0.0).then_some(float as i64)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
