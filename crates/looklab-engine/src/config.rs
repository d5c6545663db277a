use std::env;
use std::time::Duration;

use looklab_contracts::models::{Capability, ModelRegistry, ModelSelector};
use looklab_contracts::LookError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DRYRUN_PROVIDER: &str = "dryrun";

/// Checked in order; the first non-empty value wins.
pub const CREDENTIAL_ENV_KEYS: [&str; 4] =
    ["LOOKLAB_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 300.0;

/// Where the oracle credential comes from.
///
/// `Env` is re-read on every call so a credential chosen in the host's
/// selector applies to the very next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Fixed(Option<String>),
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<String> {
        match self {
            Self::Env => CREDENTIAL_ENV_KEYS.iter().find_map(|key| non_empty_env(key)),
            Self::Fixed(value) => value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub provider: String,
    pub api_base: String,
    pub credential: CredentialSource,
    pub request_timeout: Duration,
    pub analysis_model: String,
    pub image_model: String,
    pub reuse_stylized: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            credential: CredentialSource::Env,
            request_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            reuse_stylized: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(api_base) = lookup("GEMINI_API_BASE") {
            let trimmed = api_base.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.api_base = trimmed.to_string();
            }
        }
        if let Some(raw) = lookup("LOOKLAB_REQUEST_TIMEOUT") {
            config.request_timeout = parse_timeout(&raw);
        }
        if let Some(model) = lookup("LOOKLAB_ANALYSIS_MODEL") {
            config.analysis_model = model;
        }
        if let Some(model) = lookup("LOOKLAB_IMAGE_MODEL") {
            config.image_model = model;
        }
        config
    }

    /// Offline configuration backed by the deterministic oracle.
    pub fn dryrun() -> Self {
        let mut config = Self {
            provider: DRYRUN_PROVIDER.to_string(),
            credential: CredentialSource::Fixed(None),
            ..Self::default()
        };
        // Defaults are Gemini names; point them at the dryrun models.
        config.analysis_model.clear();
        config.image_model.clear();
        config
    }

    pub fn is_dryrun(&self) -> bool {
        self.provider == DRYRUN_PROVIDER
    }

    /// Snaps both models onto ones the configured provider serves and
    /// returns the fallback reasons, if any.
    pub fn resolve_models(&mut self, registry: &ModelRegistry) -> Result<Vec<String>, LookError> {
        let selector = ModelSelector::new(Some(registry.for_provider(&self.provider)));
        let mut reasons = Vec::new();
        for (capability, slot) in [
            (Capability::Analysis, &mut self.analysis_model),
            (Capability::Look, &mut self.image_model),
        ] {
            let requested = Some(slot.trim()).filter(|value| !value.is_empty());
            let selection = selector.select(requested, capability)?;
            if let Some(reason) = selection.fallback_reason {
                reasons.push(reason);
            }
            *slot = selection.model.name;
        }
        Ok(reasons)
    }
}

fn parse_timeout(raw: &str) -> Duration {
    let seconds = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TIMEOUT_S)
        .clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S);
    Duration::from_secs_f64(seconds)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
