use std::path::Path;

/// Sample rate of synthesized speech returned by the API.
pub const SYNTH_SAMPLE_RATE: u32 = 24_000;

const SYNTH_CHANNELS: u16 = 1;
const SYNTH_BITS_PER_SAMPLE: u16 = 16;

/// Guess the audio mime type from a file extension.
///
/// The transcription endpoint needs a declared mime type for the inline
/// payload; unknown extensions fall back to an opaque byte stream.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mp3",
        "m4a" | "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        "aiff" | "aif" => "audio/aiff",
        _ => "application/octet-stream",
    }
}

/// Wrap raw synthesized PCM (16-bit little-endian, mono, 24kHz) in a RIFF
/// WAV container so common players can open it.
pub fn wrap_pcm_in_wav(pcm: &[u8]) -> Vec<u8> {
    let block_align = SYNTH_CHANNELS * SYNTH_BITS_PER_SAMPLE / 8;
    let byte_rate = SYNTH_SAMPLE_RATE * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&SYNTH_CHANNELS.to_le_bytes());
    wav.extend_from_slice(&SYNTH_SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&SYNTH_BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}
