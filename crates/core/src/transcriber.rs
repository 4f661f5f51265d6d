use crate::llm::LlmClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Speech-to-text. Always handed the complete audio recorded for the turn,
/// since browser containers (WebM/Ogg) only parse from their first byte.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], language_hint: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper through an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperTranscriber {
    client: LlmClient,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(client: LlmClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], language_hint: &str) -> Result<String> {
        let file = Part::bytes(audio.to_vec())
            .file_name("audio.webm")
            .mime_str("audio/webm")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", language_hint.to_string())
            .text("response_format", "json");

        let resp = self
            .client
            .post("audio/transcriptions")
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?
            .error_for_status()
            .context("transcription returned an error status")?
            .json::<TranscriptionResponse>()
            .await
            .context("transcription response was not valid JSON")?;

        Ok(resp.text.trim().to_string())
    }
}
