//! Typed fetch failures.

use thiserror::Error;

/// Why a rule-set fetch against one agent failed.
///
/// The taxonomy deliberately separates "down" from "misconfigured":
/// operators triage [`Unreachable`](Self::Unreachable) and
/// [`AuthenticationRejected`](Self::AuthenticationRejected) differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, or timeout.
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    /// The agent rejected the presented credential.
    #[error("agent rejected credential (http {status})")]
    AuthenticationRejected { status: u16 },

    /// The body did not decode into the expected envelope.
    #[error("malformed agent response: {0}")]
    MalformedResponse(String),

    /// The agent answered but reported an application-level failure,
    /// either as a non-auth HTTP error status or a `success:false` envelope.
    #[error("agent reported failure (code {code}): {message}")]
    Application { code: String, message: String },
}

impl FetchError {
    /// Stable label used in structured log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::AuthenticationRejected { .. } => "auth_rejected",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Application { .. } => "application_error",
        }
    }
}
