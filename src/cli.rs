use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_MODEL, DEFAULT_TTS_MODEL};

#[derive(Parser)]
#[command(
    name = "gemini-scribe",
    about = "Gemini Scribe - Audio Transcription, Translation & Speech",
    long_about = "Transcribe audio files into timestamped segments with the Gemini API, optionally translate the segments, and synthesize spoken audio for a text. Reads the API key from the GEMINI_API_KEY environment variable.",
    after_help = "EXAMPLES:\n    # Transcribe an audio file\n    gemini-scribe transcribe interview.mp3\n\n    # Transcribe and translate the segments into Spanish\n    gemini-scribe transcribe interview.mp3 --language Spanish\n\n    # Translate previously saved segments\n    gemini-scribe translate segments.json --language French\n\n    # Synthesize speech into a WAV file\n    gemini-scribe speak \"Hello there\" --output hello.wav"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(name = "transcribe")]
    Transcribe {
        audio_file: String,

        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Declared mime type of the audio payload (guessed from the file
        /// extension when omitted).
        #[arg(long)]
        mime_type: Option<String>,

        /// Translate the transcribed segments into this language.
        #[arg(long, short = 'l')]
        language: Option<String>,

        /// Synthesize the (translated) transcript into a WAV file.
        #[arg(long, value_name = "FILE")]
        speak: Option<String>,
    },
    #[command(name = "translate")]
    Translate {
        /// A segments JSON document produced by the transcribe command.
        segments_file: String,

        #[arg(long, short = 'l')]
        language: String,

        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
    #[command(name = "speak")]
    Speak {
        text: String,

        #[arg(long, short = 'o', default_value = "speech.wav")]
        output: String,

        #[arg(long, default_value = DEFAULT_TTS_MODEL)]
        model: String,
    },
}
