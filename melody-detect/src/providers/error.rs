//! Provider error taxonomy

use melody_common::FailureKind;
use std::fmt::Display;
use thiserror::Error;

/// Failure of one provider call
///
/// Adapters never retry these themselves; the only local recovery is the
/// single credential refresh on [`ProviderError::Auth`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network, DNS or client-side timeout
    #[error("{provider}: transport error: {cause}")]
    Transport { provider: String, cause: String },

    /// Non-2xx response or a body that does not match the provider schema
    #[error("{provider}: protocol error: {cause}")]
    Protocol { provider: String, cause: String },

    /// Credential rejected or unavailable
    #[error("{provider}: credential rejected: {cause}")]
    Auth { provider: String, cause: String },

    /// Attempt ceiling reached while the backend was still working
    #[error("{provider}: no result after {attempts} polling attempts")]
    Timeout { provider: String, attempts: u32 },
}

impl ProviderError {
    pub fn transport(provider: &str, cause: impl Display) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn protocol(provider: &str, cause: impl Display) -> Self {
        Self::Protocol {
            provider: provider.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn auth(provider: &str, cause: impl Display) -> Self {
        Self::Auth {
            provider: provider.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Auth { provider, .. }
            | Self::Timeout { provider, .. } => provider,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } => FailureKind::Transport,
            Self::Protocol { .. } => FailureKind::Protocol,
            Self::Auth { .. } => FailureKind::Auth,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
