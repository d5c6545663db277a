use std::sync::Arc;

use looklab_contracts::grading::Preset;
use looklab_contracts::images::{is_supported_mime, ImageHandle};
use looklab_contracts::{ErrorKind, LookError};
use tracing::{info, instrument, warn};

use crate::oracle::{
    classify_failure, CallSite, InlineImage, LookOracle, LookReply, LookRequest, ReplyPart,
};

/// Generated looks are always labelled PNG, whatever the oracle reports.
pub const STYLIZED_MIME: &str = "image/png";

const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

const REFUSAL_MARKERS: &[&str] = &[
    "i can't",
    "i cannot",
    "i can not",
    "i'm unable",
    "i am unable",
    "i'm not able",
    "i am not able",
    "i won't",
    "i will not",
    "i'm not allowed",
    "i am not allowed",
];

pub fn look_instruction(preset: Preset) -> String {
    format!(
        "Apply the color grading and mood of the Reference Style Image to the Target Image. \
Style Preset: {preset}. Apply the grade at maximum strength. Preserve the subject, \
composition and structure of the Target Image exactly; transfer only color, tone and mood. \
Return only the edited image part."
    )
}

/// Requests the max-strength look; intensity is the blender's job.
#[derive(Clone)]
pub struct Requester {
    oracle: Arc<dyn LookOracle>,
    model: String,
}

impl Requester {
    pub fn new(oracle: Arc<dyn LookOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One attempt only. Failures surface with their kind intact.
    #[instrument(skip(self, reference, target), fields(oracle = self.oracle.name(), model = %self.model, %preset))]
    pub async fn transfer(
        &self,
        reference: &ImageHandle,
        target: &ImageHandle,
        preset: Preset,
    ) -> Result<ImageHandle, LookError> {
        let request = LookRequest {
            model: self.model.clone(),
            target: checked_inline(target, "target")?,
            reference: checked_inline(reference, "reference")?,
            preset,
            instruction: look_instruction(preset),
        };
        let reply = self
            .oracle
            .transfer(&request)
            .await
            .map_err(|failure| classify_failure(failure, CallSite::Transfer))?;
        let stylized = interpret_reply(reply);
        match &stylized {
            Ok(_) => info!("stylized image received"),
            Err(err) => warn!(kind = err.kind().as_str(), "transfer produced no image"),
        }
        stylized
    }
}

fn checked_inline(handle: &ImageHandle, role: &str) -> Result<InlineImage, LookError> {
    let image = InlineImage::from_handle(handle).map_err(|err| match err.kind() {
        ErrorKind::MalformedHandle => LookError::InvalidInput(format!("{role} image: {err}")),
        _ => err,
    })?;
    if !is_supported_mime(&image.mime_type) {
        return Err(LookError::InvalidInput(format!(
            "unsupported {role} image type '{}'",
            image.mime_type
        )));
    }
    Ok(image)
}

/// Normalizes an oracle reply into a stylized handle or a failure kind.
pub fn interpret_reply(reply: LookReply) -> Result<ImageHandle, LookError> {
    let LookReply {
        candidates,
        block_reason,
    } = reply;
    let Some(candidate) = candidates.into_iter().next() else {
        return Err(LookError::SafetyBlocked(
            block_reason.unwrap_or_else(|| "no candidates returned".to_string()),
        ));
    };

    let mut texts = Vec::new();
    for part in candidate.parts {
        match part {
            ReplyPart::InlineImage(image) => return image.to_handle(STYLIZED_MIME),
            ReplyPart::Text(text) => texts.push(text),
        }
    }
    let text = texts.join(" ").trim().to_string();

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(LookError::SafetyBlocked(describe(Some(reason), &text)));
        }
    }
    let lowered = text.to_lowercase();
    if REFUSAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Err(LookError::SafetyBlocked(text));
    }
    Err(LookError::NoImageProduced {
        reason: describe(candidate.finish_reason.as_deref(), &text),
    })
}

fn describe(finish_reason: Option<&str>, text: &str) -> String {
    match (finish_reason, text.is_empty()) {
        (Some(reason), true) => format!("finish reason {reason}"),
        (Some(reason), false) => format!("finish reason {reason}: {text}"),
        (None, false) => text.to_string(),
        (None, true) => "no image part in reply".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use looklab_contracts::grading::Preset;
    use looklab_contracts::images::data_url;
    use looklab_contracts::ErrorKind;

    use super::{interpret_reply, look_instruction, Requester};
    use crate::oracle::{Candidate, InlineImage, LookReply, OracleFailure, ReplyPart};
    use crate::test_support::{image_reply, metrics_reply, solid_png, StubOracle};

    fn text_reply(text: &str, finish_reason: &str) -> LookReply {
        LookReply {
            candidates: vec![Candidate {
                parts: vec![ReplyPart::Text(text.to_string())],
                finish_reason: Some(finish_reason.to_string()),
            }],
            block_reason: None,
        }
    }

    fn requester(look: Result<LookReply, OracleFailure>) -> Requester {
        Requester::new(Arc::new(StubOracle::new(metrics_reply("{}"), look)), "stub-look")
    }

    #[test]
    fn instruction_names_preset_and_strength() {
        let text = look_instruction(Preset::Analog);
        assert!(text.contains("Style Preset: Analog."));
        assert!(text.contains("maximum strength"));
        assert!(text.contains("Preserve the subject"));
    }

    #[test]
    fn empty_candidates_are_safety_blocked() {
        let err = interpret_reply(LookReply::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);

        let err = interpret_reply(LookReply {
            candidates: Vec::new(),
            block_reason: Some("PROHIBITED_CONTENT".to_string()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("PROHIBITED_CONTENT"));
    }

    #[test]
    fn first_image_part_wins_and_is_labelled_png() {
        let reply = LookReply {
            candidates: vec![Candidate {
                parts: vec![
                    ReplyPart::Text("here you go".to_string()),
                    ReplyPart::InlineImage(InlineImage {
                        mime_type: "image/jpeg".to_string(),
                        data: "Zmlyc3Q=".to_string(),
                    }),
                    ReplyPart::InlineImage(InlineImage {
                        mime_type: "image/png".to_string(),
                        data: "c2Vjb25k".to_string(),
                    }),
                ],
                finish_reason: Some("STOP".to_string()),
            }],
            block_reason: None,
        };
        let handle = interpret_reply(reply).unwrap();
        assert_eq!(handle.mime(), "image/png");
        assert_eq!(handle.read_bytes().unwrap(), b"first");
    }

    #[test]
    fn refusals_and_plain_text_are_told_apart() {
        let err = interpret_reply(text_reply("I cannot edit this photo.", "STOP")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);

        let err = interpret_reply(text_reply("", "IMAGE_SAFETY")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);

        let err = interpret_reply(text_reply("Here is a description.", "MAX_TOKENS")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoImageProduced);
        assert!(err.to_string().contains("MAX_TOKENS"));
        assert!(err.to_string().contains("Here is a description."));

        for text in [
            "Applied a warm tone per your style policy.",
            "Kept the safety rails in frame; unable to find a sky to recolor.",
        ] {
            let err = interpret_reply(text_reply(text, "STOP")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NoImageProduced, "{text}");
        }
        let err = interpret_reply(text_reply("Sorry, I won't alter this image.", "STOP"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);
    }

    #[tokio::test]
    async fn transfer_returns_stylized_image() -> anyhow::Result<()> {
        let stylized = solid_png(2, 2, [200, 10, 10]);
        let result = requester(image_reply(&stylized))
            .transfer(
                &solid_png(2, 2, [0, 0, 0]),
                &solid_png(2, 2, [9, 9, 9]),
                Preset::Dark,
            )
            .await?;
        assert_eq!(result.read_bytes()?, stylized.read_bytes()?);
        Ok(())
    }

    #[tokio::test]
    async fn quota_status_is_quota_exceeded() {
        let err = requester(Err(OracleFailure::Status {
            code: 429,
            body: "Resource has been exhausted".to_string(),
        }))
        .transfer(
            &solid_png(1, 1, [0, 0, 0]),
            &solid_png(1, 1, [1, 1, 1]),
            Preset::Estate,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn empty_candidate_stub_is_safety_blocked() {
        let oracle = Arc::new(StubOracle::new(metrics_reply("{}"), Ok(LookReply::default())));
        let err = Requester::new(oracle.clone(), "stub-look")
            .transfer(
                &solid_png(1, 1, [0, 0, 0]),
                &solid_png(1, 1, [1, 1, 1]),
                Preset::Corporate,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyBlocked);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_target_never_reaches_oracle() {
        let oracle = Arc::new(StubOracle::new(metrics_reply("{}"), Ok(LookReply::default())));
        let err = Requester::new(oracle.clone(), "stub-look")
            .transfer(
                &solid_png(1, 1, [0, 0, 0]),
                &data_url::encode(b"GIF89a", "image/gif"),
                Preset::Corporate,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(oracle.calls(), 0);
    }
}
