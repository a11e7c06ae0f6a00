use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::api::{
    ApiErrorBody, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    Part, transcription_schema, translation_schema,
};
use crate::config::{Config, DEFAULT_VOICE};
use crate::error::{ScribeError, ScribeResult};
use crate::recovery::{recover, strip_code_fence};
use crate::segment::TranscriptionSegment;
use crate::timestamp::normalize;

/// Instructions sent alongside the audio payload. Three policies the model
/// must follow: acoustic timing, verbatim granular segmentation, and
/// double-quote JSON safety.
const TRANSCRIBE_INSTRUCTIONS: &str = "\
Transcribe this audio recording into timestamped segments.

Timing rules:
- startTime and endTime must mark the actual acoustic onset and offset of \
the spoken words. Never infer a timestamp from rhythm or expected pacing.
- When a phrase is repeated, give every repetition the timestamps of the \
moment it is actually spoken; do not advance timestamps speculatively. \
Silence between repetitions must show up as a gap between the segments.

Segmentation rules:
- Keep each segment under roughly 5 seconds; split at natural pauses.
- Transcribe verbatim: keep filler words, false starts, and disfluencies.
- Emit a repeated phrase as one segment per occurrence. Never deduplicate.

Output rules:
- Respond with JSON of the form {\"segments\": [{\"startTime\": \
\"HH:MM:SS.mmm\", \"endTime\": \"HH:MM:SS.mmm\", \"text\": \"...\"}]}.
- Delimit every key and every text value with double quotes, and escape any \
double quote inside the text as \\\". Single quotes may appear inside text \
but must never delimit keys or values.";

#[derive(Deserialize)]
struct TranslationDocument {
    segments: Vec<TranscriptionSegment>,
}

/// Client for the Gemini transcription, translation, and synthesis requests.
///
/// Explicitly constructed and threaded through callers; holds the one
/// credential and the shared HTTP connection pool. Each operation is
/// stateless and scoped to a single request.
pub struct GeminiClient {
    http: reqwest::Client,
    config: Config,
}

impl GeminiClient {
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.config.base_url)
    }

    /// Transcribe an audio payload into an ordered list of segments with
    /// canonical timestamps.
    ///
    /// Cancellation is cooperative: if `cancel` is already set, or fires
    /// while the request is in flight, the call resolves as
    /// [`ScribeError::Cancelled`] and any eventual response is discarded.
    pub async fn transcribe(
        &self,
        model: &str,
        audio: &[u8],
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> ScribeResult<Vec<TranscriptionSegment>> {
        info!(
            "Transcribing {} bytes of {mime_type} with {model}",
            audio.len()
        );

        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::inline_data(mime_type, BASE64.encode(audio)),
                Part::text(TRANSCRIBE_INSTRUCTIONS),
            ])],
            generation_config: Some(GenerationConfig::json_with_schema(transcription_schema())),
        };

        let response = self.generate_cancellable(model, &request, cancel).await?;
        let text = response.first_text().ok_or(ScribeError::EmptyResponse)?;

        let recovered = recover(strip_code_fence(&text))?;
        debug!(
            "Recovered {} segments via {:?} tier",
            recovered.segments.len(),
            recovered.tier
        );

        Ok(recovered
            .segments
            .into_iter()
            .map(|raw| TranscriptionSegment {
                start_time: normalize(raw.start_time.as_deref().unwrap_or("")),
                end_time: normalize(raw.end_time.as_deref().unwrap_or("")),
                text: raw.text_as_string(),
                translated_text: None,
            })
            .collect())
    }

    /// Translate a segment list, attaching `translated_text` to each entry.
    ///
    /// The model is instructed to return timestamps byte-identical to the
    /// input; the returned list is rebuilt from the response. A segment
    /// count mismatch is rejected, a timestamp divergence is accepted with
    /// a warning.
    pub async fn translate(
        &self,
        model: &str,
        segments: &[TranscriptionSegment],
        target_language: &str,
    ) -> ScribeResult<Vec<TranscriptionSegment>> {
        info!(
            "Translating {} segments into {target_language} with {model}",
            segments.len()
        );

        let payload = serde_json::to_string_pretty(&serde_json::json!({ "segments": segments }))
            .map_err(|e| ScribeError::TranslationFailed {
                message: format!("failed to serialize segments: {e}"),
            })?;
        let prompt = format!(
            "Translate the text of each segment below into {target_language}. \
Return JSON with the same segments in the same order, each keeping \
startTime, endTime, and text exactly as given and adding translatedText. \
You are the translator, not a re-transcriber: every startTime and endTime \
must be returned byte-identical to the input.\n\n{payload}"
        );

        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            generation_config: Some(GenerationConfig::json_with_schema(translation_schema())),
        };

        let response = self.generate(model, &request).await?;
        let text = response
            .first_text()
            .ok_or_else(|| ScribeError::TranslationFailed {
                message: "model returned an empty response".into(),
            })?;
        let document: TranslationDocument = serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| ScribeError::TranslationFailed {
                message: format!("unparseable response: {e}"),
            })?;

        if document.segments.len() != segments.len() {
            return Err(ScribeError::TranslationIntegrity {
                expected: segments.len(),
                got: document.segments.len(),
            });
        }
        for (original, translated) in segments.iter().zip(&document.segments) {
            if original.start_time != translated.start_time
                || original.end_time != translated.end_time
            {
                warn!(
                    "Translation altered timestamps: {}-{} became {}-{}",
                    original.start_time,
                    original.end_time,
                    translated.start_time,
                    translated.end_time
                );
            }
        }

        Ok(document.segments)
    }

    /// Synthesize spoken audio for a text string.
    ///
    /// Returns decoded single-channel 24kHz PCM bytes, or `None` when the
    /// response carries no audio part. One request per call; no caching.
    pub async fn synthesize(&self, model: &str, text: &str) -> ScribeResult<Option<Vec<u8>>> {
        info!("Synthesizing {} characters with {model}", text.len());

        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(text)])],
            generation_config: Some(GenerationConfig::audio_with_voice(DEFAULT_VOICE)),
        };

        let response = self.generate(model, &request).await?;
        match response.first_inline_data() {
            Some(data) => match BASE64.decode(data) {
                Ok(bytes) => {
                    debug!("Synthesized {} bytes of audio", bytes.len());
                    Ok(Some(bytes))
                }
                Err(e) => {
                    warn!("Synthesis response carried undecodable audio: {e}");
                    Ok(None)
                }
            },
            None => {
                warn!("Synthesis response carried no audio part");
                Ok(None)
            }
        }
    }

    /// Issue one `generateContent` request and map failures into the error
    /// taxonomy.
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> ScribeResult<GenerateContentResponse> {
        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => {
                    debug!("Provider error code {}", parsed.error.code);
                    parsed.error.message
                }
                Err(_) => format!("request to {model} failed"),
            };
            return Err(ScribeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| ScribeError::Api {
                status: status.as_u16(),
                message: format!("malformed response body: {e}"),
            })?;

        if let Some(reason) = response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            if reason != "STOP" {
                warn!("Generation finished with reason {reason}; output may be truncated");
            }
        }

        Ok(response)
    }

    /// [`generate`](Self::generate) raced against a cancellation token.
    /// Cancellation wins ties, so a response that arrives together with the
    /// signal is discarded rather than surfaced as success.
    async fn generate_cancellable(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> ScribeResult<GenerateContentResponse> {
        if cancel.is_cancelled() {
            return Err(ScribeError::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScribeError::Cancelled),
            result = self.generate(model, request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
    }

    fn mock_client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(Config::with_base_url("test-key", server.uri()))
    }

    fn segment(start: &str, end: &str, text: &str) -> TranscriptionSegment {
        TranscriptionSegment {
            start_time: start.into(),
            end_time: end.into(),
            text: text.into(),
            translated_text: None,
        }
    }

    #[tokio::test]
    async fn transcribe_normalizes_and_preserves_order() {
        let server = MockServer::start().await;
        let body = "```json\n{\"segments\": [\
            {\"startTime\": \"5:30\", \"endTime\": \"331.25\", \"text\": \"first\"},\
            {\"startTime\": \"02:15.500\", \"endTime\": \"02:16.000\", \"text\": \"second\"}\
        ]}\n```";
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(body)))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let segments = client
            .transcribe(
                "gemini-2.5-flash",
                b"fake-audio",
                "audio/wav",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_time, "00:05:30.000");
        assert_eq!(segments[0].end_time, "00:05:31.250");
        assert_eq!(segments[0].text, "first");
        assert_eq!(segments[1].start_time, "00:02:15.500");
        assert_eq!(segments[1].text, "second");
        assert!(segments[0].translated_text.is_none());
    }

    #[tokio::test]
    async fn transcribe_empty_response_is_distinct_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::EmptyResponse));
    }

    #[tokio::test]
    async fn transcribe_surfaces_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ScribeError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transcribe_unparseable_error_body_gets_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream blew up"))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ScribeError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "request to gemini-2.5-flash failed");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transcribe_unrecoverable_text_propagates_structure_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_response("I could not transcribe this audio.")),
            )
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::UnrecoverableStructure { .. }));
    }

    #[tokio::test]
    async fn pre_cancelled_token_never_yields_success() {
        let server = MockServer::start().await;
        // The server would answer successfully; the result must still be
        // a cancellation.
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response("{\"segments\": []}")),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_during_flight_wins_over_late_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_response("{\"segments\": []}"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let client = mock_client(&server);
        let err = client
            .transcribe("gemini-2.5-flash", b"x", "audio/wav", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn translate_attaches_translations() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "segments": [
                {"startTime": "00:00:00.000", "endTime": "00:00:01.000", "text": "bonjour", "translatedText": "hello"},
                {"startTime": "00:00:01.000", "endTime": "00:00:02.000", "text": "le monde", "translatedText": "world"}
            ]
        });
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response(&body.to_string())),
            )
            .mount(&server)
            .await;

        let input = vec![
            segment("00:00:00.000", "00:00:01.000", "bonjour"),
            segment("00:00:01.000", "00:00:02.000", "le monde"),
        ];
        let client = mock_client(&server);
        let translated = client
            .translate("gemini-2.5-flash", &input, "English")
            .await
            .unwrap();

        assert_eq!(translated.len(), 2);
        assert_eq!(translated[0].translated_text.as_deref(), Some("hello"));
        assert_eq!(translated[0].start_time, "00:00:00.000");
        assert_eq!(translated[1].translated_text.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn translate_segment_count_mismatch_is_rejected() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "segments": [
                {"startTime": "00:00:00.000", "endTime": "00:00:01.000", "text": "bonjour", "translatedText": "hello"}
            ]
        });
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response(&body.to_string())),
            )
            .mount(&server)
            .await;

        let input = vec![
            segment("00:00:00.000", "00:00:01.000", "bonjour"),
            segment("00:00:01.000", "00:00:02.000", "le monde"),
        ];
        let client = mock_client(&server);
        let err = client
            .translate("gemini-2.5-flash", &input, "English")
            .await
            .unwrap_err();
        match err {
            ScribeError::TranslationIntegrity { expected, got } => {
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected TranslationIntegrity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn translate_unparseable_response_is_translation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response("not json at all")),
            )
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let err = client
            .translate(
                "gemini-2.5-flash",
                &[segment("00:00:00.000", "00:00:01.000", "hi")],
                "French",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::TranslationFailed { .. }));
    }

    #[tokio::test]
    async fn synthesize_decodes_inline_audio() {
        let server = MockServer::start().await;
        let encoded = BASE64.encode(b"pcm-bytes");
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-preview-tts:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"inlineData": {"mimeType": "audio/pcm", "data": encoded}}]}
                }]
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let audio = client
            .synthesize("gemini-2.5-flash-preview-tts", "hello")
            .await
            .unwrap();
        assert_eq!(audio.as_deref(), Some(b"pcm-bytes".as_slice()));
    }

    #[tokio::test]
    async fn synthesize_without_audio_part_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response("no audio here")),
            )
            .mount(&server)
            .await;

        let client = mock_client(&server);
        let audio = client
            .synthesize("gemini-2.5-flash-preview-tts", "hello")
            .await
            .unwrap();
        assert!(audio.is_none());
    }
}
