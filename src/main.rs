mod api;
mod audio;
mod cli;
mod client;
mod config;
mod error;
mod recovery;
mod segment;
mod timestamp;

use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use client::GeminiClient;
use config::Config;
use segment::TranscriptionSegment;

#[derive(serde::Deserialize)]
struct SegmentsFile {
    segments: Vec<TranscriptionSegment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let client = GeminiClient::new(Config::from_env());

    match cli.command {
        Commands::Transcribe {
            audio_file,
            model,
            mime_type,
            language,
            speak,
        } => run_transcribe(&client, &audio_file, &model, mime_type, language, speak).await,
        Commands::Translate {
            segments_file,
            language,
            model,
        } => run_translate(&client, &segments_file, &language, &model).await,
        Commands::Speak {
            text,
            output,
            model,
        } => run_speak(&client, &text, &output, &model).await,
    }
}

async fn run_transcribe(
    client: &GeminiClient,
    audio_file: &str,
    model: &str,
    mime_type: Option<String>,
    language: Option<String>,
    speak: Option<String>,
) -> Result<()> {
    let path = Path::new(audio_file);
    if !path.exists() {
        return Err(anyhow!("Audio file not found: {audio_file}"));
    }
    let audio_data = fs::read(path).map_err(|e| anyhow!("Failed to read audio file: {e}"))?;
    let mime = mime_type.unwrap_or_else(|| audio::guess_mime_type(path).to_string());

    println!(
        "📁 Audio source: {audio_file} ({} bytes, {mime})",
        audio_data.len()
    );

    // Ctrl-C cancels the in-flight request instead of killing the process.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling transcription");
            trigger.cancel();
        }
    });

    let mut segments = match client.transcribe(model, &audio_data, &mime, &cancel).await {
        Ok(segments) => segments,
        Err(e) if e.is_cancelled() => {
            println!("⏹️  Transcription cancelled");
            return Ok(());
        }
        Err(e) => {
            log::error!("Transcription failed ({}): {e}", e.category());
            return Err(anyhow!("Transcription failed: {e}"));
        }
    };
    println!("✅ Transcribed {} segments", segments.len());

    if let Some(ref language) = language {
        segments = client
            .translate(model, &segments, language)
            .await
            .map_err(|e| anyhow!("Translation failed: {e}"))?;
        println!("🌍 Translated into {language}");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "segments": segments }))?
    );

    if let Some(ref output) = speak {
        let spoken: Vec<&str> = segments
            .iter()
            .map(|s| s.translated_text.as_deref().unwrap_or(s.text.as_str()))
            .collect();
        write_speech(client, &spoken.join(" "), output, config::DEFAULT_TTS_MODEL).await?;
    }

    Ok(())
}

async fn run_translate(
    client: &GeminiClient,
    segments_file: &str,
    language: &str,
    model: &str,
) -> Result<()> {
    let text = fs::read_to_string(segments_file)
        .map_err(|e| anyhow!("Failed to read segments file: {e}"))?;
    let segments = parse_segments_file(&text)?;
    println!("📁 Loaded {} segments from {segments_file}", segments.len());

    let translated = client
        .translate(model, &segments, language)
        .await
        .map_err(|e| anyhow!("Translation failed: {e}"))?;

    println!("🌍 Translated into {language}");
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "segments": translated }))?
    );
    Ok(())
}

async fn run_speak(client: &GeminiClient, text: &str, output: &str, model: &str) -> Result<()> {
    write_speech(client, text, output, model).await
}

async fn write_speech(
    client: &GeminiClient,
    text: &str,
    output: &str,
    model: &str,
) -> Result<()> {
    let pcm = client
        .synthesize(model, text)
        .await
        .map_err(|e| anyhow!("Speech synthesis failed: {e}"))?
        .ok_or_else(|| anyhow!("Model returned no audio"))?;

    fs::write(output, audio::wrap_pcm_in_wav(&pcm))
        .map_err(|e| anyhow!("Failed to write {output}: {e}"))?;
    println!(
        "🔊 Wrote {output} ({} bytes, {}Hz mono)",
        pcm.len() + 44,
        audio::SYNTH_SAMPLE_RATE
    );
    Ok(())
}

/// Accept either `{"segments": [...]}` (as printed by `transcribe`) or a
/// bare segment array.
fn parse_segments_file(text: &str) -> Result<Vec<TranscriptionSegment>> {
    if let Ok(doc) = serde_json::from_str::<SegmentsFile>(text) {
        return Ok(doc.segments);
    }
    serde_json::from_str::<Vec<TranscriptionSegment>>(text)
        .map_err(|e| anyhow!("Invalid segments file: {e}"))
}
