use std::env;

use crate::api::DEFAULT_BASE_URL;

/// Default model for transcription and translation requests.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default model for speech synthesis requests.
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Fixed prebuilt voice used for all synthesis requests.
pub const DEFAULT_VOICE: &str = "Kore";

/// Process-wide client configuration.
///
/// The API key is read once at startup and deliberately not validated here:
/// a missing or bad key surfaces at the first request, as a provider error.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Configuration pointing at a non-default endpoint, used by tests.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}
