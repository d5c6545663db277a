use std::time::Duration;

use async_trait::async_trait;
use looklab_contracts::grading::LookMetrics;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use super::{
    AnalysisOracle, AnalysisReply, AnalysisRequest, Candidate, InlineImage, LookOracle, LookReply,
    LookRequest, NamedOracle, OracleFailure, ReplyPart,
};
use crate::config::{CredentialSource, EngineConfig};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// `generateContent` client for both the analysis and the look models.
pub struct GeminiOracle {
    api_base: String,
    credential: CredentialSource,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiOracle {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn default_safety_settings() -> Vec<Value> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "BLOCK_NONE",
            })
        })
        .collect()
    }

    pub(crate) fn analysis_payload(request: &AnalysisRequest) -> Value {
        let mut properties = Map::new();
        for axis in LookMetrics::AXES {
            properties.insert(axis.to_string(), json!({ "type": "INTEGER" }));
        }
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    inline_part(&request.image),
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": properties,
                    "required": LookMetrics::AXES,
                },
            },
        })
    }

    pub(crate) fn look_payload(request: &LookRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": "Target Image:" },
                    inline_part(&request.target),
                    { "text": "Reference Style Image:" },
                    inline_part(&request.reference),
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
            "safetySettings": Self::default_safety_settings(),
        })
    }

    async fn post(&self, model: &str, payload: &Value) -> Result<Value, OracleFailure> {
        let Some(api_key) = self.credential.resolve() else {
            return Err(OracleFailure::MissingCredential);
        };
        let endpoint = self.endpoint_for_model(model);
        debug!(%endpoint, "posting Gemini request");

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| OracleFailure::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| OracleFailure::Transport(format!("response body read failed: {err}")))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Gemini request rejected");
            return Err(OracleFailure::Status {
                code: status.as_u16(),
                body: truncate_text(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        serde_json::from_str(&body)
            .map_err(|err| OracleFailure::InvalidPayload(format!("Gemini returned invalid JSON: {err}")))
    }
}

impl NamedOracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl AnalysisOracle for GeminiOracle {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReply, OracleFailure> {
        let payload = self
            .post(&request.model, &Self::analysis_payload(request))
            .await?;
        let text = candidate_parts(&payload)
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<String>();
        Ok(AnalysisReply { text })
    }
}

#[async_trait]
impl LookOracle for GeminiOracle {
    #[instrument(skip(self, request), fields(model = %request.model, preset = %request.preset))]
    async fn transfer(&self, request: &LookRequest) -> Result<LookReply, OracleFailure> {
        let payload = self.post(&request.model, &Self::look_payload(request)).await?;
        Ok(parse_look_reply(&payload))
    }
}

/// Maps a `generateContent` response onto candidates and parts.
pub fn parse_look_reply(payload: &Value) -> LookReply {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(parse_candidate).collect())
        .unwrap_or_default();
    let block_reason = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string);
    LookReply {
        candidates,
        block_reason,
    }
}

fn parse_candidate(candidate: &Value) -> Candidate {
    let mut parts = Vec::new();
    let rows = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for part in rows {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object);
        if let Some(inline) = inline {
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            parts.push(ReplyPart::InlineImage(InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }));
            continue;
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            parts.push(ReplyPart::Text(text.to_string()));
        }
    }
    Candidate {
        parts,
        finish_reason: candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn candidate_parts(payload: &Value) -> Vec<Value> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn inline_part(image: &InlineImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.data,
        }
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
