use doodle_contracts::ValidationError;

/// Failure of a single call to an inference backend.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("{provider} throttled the request")]
    Throttled { provider: String },

    #[error("{provider} request timed out after {millis}ms")]
    Timeout { provider: String, millis: u128 },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request failed ({code}): {body}")]
    Status {
        provider: String,
        code: u16,
        body: String,
    },

    #[error("{provider} returned a malformed payload: {detail}")]
    MalformedResponse { provider: String, detail: String },

    #[error("{provider} returned no image")]
    MissingImage { provider: String },

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },
}

impl InferenceError {
    /// Whether the caller should degrade the same way it does for rate limiting.
    ///
    /// Timeouts count: an unresponsive backend is treated like a saturated one.
    pub fn is_throttle_like(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Timeout { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Throttled { provider }
            | Self::Timeout { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Status { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::MissingImage { provider }
            | Self::Unsupported { provider, .. } => provider,
        }
    }

    /// Whether a fresh attempt may succeed: connection-level failures only.
    /// Timeouts are final; the caller's deadline covers every attempt.
    pub fn is_retryable_transport(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_request(),
            _ => false,
        }
    }
}

/// Terminal failure of a generation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input failed validation; no inference call was made.
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error("generation failed: {0}")]
    Internal(#[from] anyhow::Error),
}
