use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One transcribed time-bounded span of speech.
///
/// Timestamps are always in the canonical `HH:MM:SS.mmm` form once a segment
/// has passed through the transcription client. `translated_text` is only
/// present after translation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionSegment {
    /// Canonical start timestamp.
    pub start_time: String,
    /// Canonical end timestamp.
    pub end_time: String,
    /// Verbatim transcription for the time span.
    pub text: String,
    /// Translation of `text`, 1:1 by position with the original segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}

/// A segment as recovered from raw model output, before normalization.
///
/// Every field is lenient: timestamps may be absent or oddly formatted, and
/// `text` may be any JSON value. The transcription client normalizes the
/// timestamps and coerces `text` to a string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSegment {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub text: Value,
}

impl RawSegment {
    /// Coerce the recovered `text` value into a plain string.
    pub fn text_as_string(&self) -> String {
        match &self.text {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_serializes_camel_case() {
        let segment = TranscriptionSegment {
            start_time: "00:00:01.000".into(),
            end_time: "00:00:02.000".into(),
            text: "hello".into(),
            translated_text: None,
        };
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["startTime"], "00:00:01.000");
        assert_eq!(json["endTime"], "00:00:02.000");
        assert!(json.get("translatedText").is_none());
    }

    #[test]
    fn segment_with_translation_roundtrips() {
        let segment = TranscriptionSegment {
            start_time: "00:00:01.000".into(),
            end_time: "00:00:02.000".into(),
            text: "bonjour".into(),
            translated_text: Some("hello".into()),
        };
        let json = serde_json::to_string(&segment).unwrap();
        let back: TranscriptionSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn raw_segment_tolerates_missing_fields() {
        let raw: RawSegment = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(raw.start_time.is_none());
        assert_eq!(raw.text_as_string(), "hi");
    }

    #[test]
    fn raw_segment_coerces_non_string_text() {
        let raw: RawSegment = serde_json::from_str(r#"{"text": 42}"#).unwrap();
        assert_eq!(raw.text_as_string(), "42");

        let raw: RawSegment = serde_json::from_str(r#"{"text": null}"#).unwrap();
        assert_eq!(raw.text_as_string(), "");
    }
}
