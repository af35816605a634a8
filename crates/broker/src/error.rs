use thiserror::Error;

/// Failure taxonomy for the call pipeline and its collaborators.
///
/// Each variant maps to a stable wire code via [`ProxyError::code`]; the
/// tool surface forwards that code to the agent as `{code, message}`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no active credential for provider: {0}")]
    NoCredential(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("receipt chain corrupt: {0}")]
    ChainCorrupt(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Stable code string used by the inbound tool surface.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            Self::NoCredential(_) => "NO_CREDENTIAL",
            Self::BudgetExceeded(_) => "BUDGET_EXCEEDED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::ChainCorrupt(_) => "CHAIN_CORRUPT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }
}
