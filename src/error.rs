use thiserror::Error;

/// Result alias for all client and recovery operations.
pub type ScribeResult<T> = Result<T, ScribeError>;

/// Errors surfaced by the transcription, translation, and synthesis clients.
///
/// No variant is retried internally; every failure is scoped to a single
/// request and handed back to the caller. [`ScribeError::Cancelled`] must
/// stay distinguishable from every other failure and is never logged as one.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The provider returned a response with no usable text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// All three recovery tiers failed to extract a single segment.
    #[error("unrecoverable response structure: {detail}")]
    UnrecoverableStructure {
        /// What the last recovery attempt saw.
        detail: String,
    },

    /// Network or transport failure from the HTTP layer.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request or failed server-side.
    #[error("provider error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider message when available, else a generic fallback.
        message: String,
    },

    /// The translation response could not be parsed.
    #[error("translation failed: {message}")]
    TranslationFailed {
        /// Error description.
        message: String,
    },

    /// The translation response does not line up with the input segments.
    #[error("translation returned {got} segments for {expected} inputs")]
    TranslationIntegrity {
        /// Segment count sent to the model.
        expected: usize,
        /// Segment count in the response.
        got: usize,
    },
}

impl ScribeError {
    /// Whether this is a caller-initiated cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Category string for log lines.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::EmptyResponse => "empty_response",
            Self::UnrecoverableStructure { .. } => "structure",
            Self::Http(_) => "transport",
            Self::Api { .. } => "api",
            Self::TranslationFailed { .. } => "translation",
            Self::TranslationIntegrity { .. } => "translation_integrity",
        }
    }
}
