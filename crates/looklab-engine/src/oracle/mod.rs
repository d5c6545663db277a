//! Transport boundary to the external analysis and generative capabilities.
//!
//! Oracles only move bytes and report raw failures. Turning a reply or an
//! [`OracleFailure`] into a [`LookError`] is the analyzer's and requester's job.

mod dryrun;
mod gemini;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use looklab_contracts::grading::Preset;
use looklab_contracts::images::{data_url, ImageHandle};
use looklab_contracts::LookError;
use thiserror::Error;

use crate::config::EngineConfig;

pub use dryrun::DryrunOracle;
pub use gemini::{parse_look_reply, GeminiOracle};

/// Base64 image payload as it travels to and from an oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Embeds referenced handles first; the payload is not re-encoded.
    pub fn from_handle(handle: &ImageHandle) -> Result<Self, LookError> {
        let embedded = handle.materialize()?;
        let url = embedded.as_data_url().unwrap_or_default();
        let (mime_type, data) = data_url::split(url)?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    pub fn to_handle(&self, mime_type: &str) -> Result<ImageHandle, LookError> {
        ImageHandle::from_data_url(data_url::format_encoded(mime_type, &self.data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub model: String,
    pub image: InlineImage,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReply {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookRequest {
    pub model: String,
    pub target: InlineImage,
    pub reference: InlineImage,
    pub preset: Preset,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPart {
    InlineImage(InlineImage),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub parts: Vec<ReplyPart>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LookReply {
    pub candidates: Vec<Candidate>,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleFailure {
    #[error("no credential available")]
    MissingCredential,

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

pub trait NamedOracle: Send + Sync {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait AnalysisOracle: NamedOracle {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReply, OracleFailure>;
}

#[async_trait]
pub trait LookOracle: NamedOracle {
    async fn transfer(&self, request: &LookRequest) -> Result<LookReply, OracleFailure>;
}

/// Which call a failure came from; only the generic fallback kind differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    Analysis,
    Transfer,
}

const QUOTA_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED"];
const CREDENTIAL_MARKERS: &[&str] = &[
    "API_KEY_INVALID",
    "API key not valid",
    "Requested entity was not found",
];

pub fn classify_failure(failure: OracleFailure, site: CallSite) -> LookError {
    let generic = |detail: String| match site {
        CallSite::Analysis => LookError::AnalysisFailed(detail),
        CallSite::Transfer => LookError::TransferFailed(detail),
    };
    match failure {
        OracleFailure::MissingCredential => LookError::CredentialMissing,
        OracleFailure::Status { code, body } => {
            if code == 429 || QUOTA_MARKERS.iter().any(|marker| body.contains(marker)) {
                return LookError::QuotaExceeded(format!("HTTP {code}: {body}"));
            }
            if matches!(code, 401 | 403)
                || CREDENTIAL_MARKERS.iter().any(|marker| body.contains(marker))
            {
                return LookError::CredentialInvalid(format!("HTTP {code}: {body}"));
            }
            generic(format!("HTTP {code}: {body}"))
        }
        OracleFailure::Transport(detail) => generic(detail),
        OracleFailure::InvalidPayload(detail) => match site {
            CallSite::Analysis => LookError::AnalysisMalformed(detail),
            CallSite::Transfer => LookError::TransferFailed(detail),
        },
    }
}

#[derive(Default)]
pub struct OracleRegistry {
    analysis: BTreeMap<String, Arc<dyn AnalysisOracle>>,
    look: BTreeMap<String, Arc<dyn LookOracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one oracle serving both capabilities under its name.
    pub fn register<O>(&mut self, oracle: O)
    where
        O: AnalysisOracle + LookOracle + 'static,
    {
        let name = NamedOracle::name(&oracle).to_string();
        let shared = Arc::new(oracle);
        self.analysis.insert(name.clone(), shared.clone());
        self.look.insert(name, shared);
    }

    pub fn analysis(&self, name: &str) -> Result<Arc<dyn AnalysisOracle>, LookError> {
        self.analysis
            .get(name)
            .cloned()
            .ok_or_else(|| LookError::InvalidInput(format!("unknown provider '{name}'")))
    }

    pub fn look(&self, name: &str) -> Result<Arc<dyn LookOracle>, LookError> {
        self.look
            .get(name)
            .cloned()
            .ok_or_else(|| LookError::InvalidInput(format!("unknown provider '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        self.analysis.keys().cloned().collect()
    }
}

pub fn default_oracle_registry(config: &EngineConfig) -> OracleRegistry {
    let mut registry = OracleRegistry::new();
    registry.register(DryrunOracle);
    registry.register(GeminiOracle::new(config));
    registry
}
