use thiserror::Error;

/// Every failure the look-transfer core can surface.
///
/// Variants are never downgraded on the way up: the analyzer and requester
/// return the exact kind they classified so the host can pick between a
/// credential prompt, a quota upsell or a safety notice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookError {
    #[error("no access credential configured")]
    CredentialMissing,

    #[error("access credential rejected: {0}")]
    CredentialInvalid(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("analysis response malformed: {0}")]
    AnalysisMalformed(String),

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("generation blocked by safety filters: {0}")]
    SafetyBlocked(String),

    #[error("no image produced: {reason}")]
    NoImageProduced { reason: String },

    #[error("look transfer failed: {0}")]
    TransferFailed(String),

    #[error("image decode failed: {0}")]
    DecodeFailed(String),

    #[error("malformed image handle: {0}")]
    MalformedHandle(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid batch transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("a generation is already in flight")]
    GenerationInFlight,

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown version: {0}")]
    UnknownVersion(String),

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Flat discriminant of [`LookError`] for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CredentialMissing,
    CredentialInvalid,
    QuotaExceeded,
    AnalysisMalformed,
    AnalysisFailed,
    SafetyBlocked,
    NoImageProduced,
    TransferFailed,
    DecodeFailed,
    MalformedHandle,
    InvalidInput,
    InvalidTransition,
    GenerationInFlight,
    NotReady,
    Cancelled,
    UnknownVersion,
    UnknownProject,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CredentialMissing => "credential_missing",
            Self::CredentialInvalid => "credential_invalid",
            Self::QuotaExceeded => "quota_exceeded",
            Self::AnalysisMalformed => "analysis_malformed",
            Self::AnalysisFailed => "analysis_failed",
            Self::SafetyBlocked => "safety_blocked",
            Self::NoImageProduced => "no_image_produced",
            Self::TransferFailed => "transfer_failed",
            Self::DecodeFailed => "decode_failed",
            Self::MalformedHandle => "malformed_handle",
            Self::InvalidInput => "invalid_input",
            Self::InvalidTransition => "invalid_transition",
            Self::GenerationInFlight => "generation_in_flight",
            Self::NotReady => "not_ready",
            Self::Cancelled => "cancelled",
            Self::UnknownVersion => "unknown_version",
            Self::UnknownProject => "unknown_project",
            Self::Io => "io",
        }
    }
}

/// What the surrounding host should offer the user after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Open the host credential selector.
    SelectCredential,
    /// Show the capability-upgrade (quota) prompt.
    QuotaUpsell,
    /// Explain that the image was refused by safety filters.
    SafetyNotice,
    /// Nothing specific; the user may simply try again.
    Retry,
    None,
}

impl LookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CredentialMissing => ErrorKind::CredentialMissing,
            Self::CredentialInvalid(_) => ErrorKind::CredentialInvalid,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::AnalysisMalformed(_) => ErrorKind::AnalysisMalformed,
            Self::AnalysisFailed(_) => ErrorKind::AnalysisFailed,
            Self::SafetyBlocked(_) => ErrorKind::SafetyBlocked,
            Self::NoImageProduced { .. } => ErrorKind::NoImageProduced,
            Self::TransferFailed(_) => ErrorKind::TransferFailed,
            Self::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Self::MalformedHandle(_) => ErrorKind::MalformedHandle,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::GenerationInFlight => ErrorKind::GenerationInFlight,
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnknownVersion(_) => ErrorKind::UnknownVersion,
            Self::UnknownProject(_) => ErrorKind::UnknownProject,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn remedy(&self) -> Remedy {
        match self.kind() {
            ErrorKind::CredentialMissing | ErrorKind::CredentialInvalid => {
                Remedy::SelectCredential
            }
            ErrorKind::QuotaExceeded => Remedy::QuotaUpsell,
            ErrorKind::SafetyBlocked => Remedy::SafetyNotice,
            ErrorKind::AnalysisFailed
            | ErrorKind::AnalysisMalformed
            | ErrorKind::NoImageProduced
            | ErrorKind::TransferFailed
            | ErrorKind::DecodeFailed
            | ErrorKind::Cancelled
            | ErrorKind::Io => Remedy::Retry,
            _ => Remedy::None,
        }
    }

    /// True when the host should invoke its credential selector.
    pub fn needs_credential_selection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CredentialMissing
                | ErrorKind::CredentialInvalid
                | ErrorKind::QuotaExceeded
        )
    }
}

impl From<std::io::Error> for LookError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
