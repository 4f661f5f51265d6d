//! The per-session turn lifecycle: INACTIVE -> ACTIVE -> RESPONDING -> INACTIVE.
//!
//! A `TurnManager` buffers speech, typed text and images into its
//! `TurnContext` until a commit hands the whole turn to the `Orchestrator`.
//! While a commit is running every ingestion call is dropped, so a session
//! never has more than one turn in flight.

use crate::error::TurnError;
use crate::events::{ClientAction, ContextSnapshot, ServerEvent, TurnPhase};
use crate::orchestrator::Orchestrator;
use crate::settings::{AudioTranscription, TurnSettings};
use crate::transcriber::Transcriber;
use crate::triggers::{contains_screenshot_request, contains_wake_phrase, strip_commit_phrase};
use crate::turn_context::{ImageSource, TextMode, TextSource, TurnContext, strip_data_uri};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// What an ingestion call did with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Nothing usable in the input.
    Ignored,
    /// A commit is in flight; the input was discarded.
    Dropped,
    /// Stored in the turn context.
    Buffered,
    /// Stored, and a commit phrase asked for the turn to be committed.
    CommitRequested,
}

pub struct TurnManager {
    context: TurnContext,
    responding: bool,
    audio: Vec<u8>,
    screenshot_triggered: bool,
    orchestrator: Orchestrator,
    transcriber: Arc<dyn Transcriber>,
    settings: TurnSettings,
    events: mpsc::Sender<ServerEvent>,
}

impl TurnManager {
    pub fn new(
        orchestrator: Orchestrator,
        transcriber: Arc<dyn Transcriber>,
        settings: TurnSettings,
        events: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            context: TurnContext::new(),
            responding: false,
            audio: Vec::new(),
            screenshot_triggered: false,
            orchestrator,
            transcriber,
            settings,
            events,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        if self.responding {
            TurnPhase::Responding
        } else if self.context.active {
            TurnPhase::Active
        } else {
            TurnPhase::Inactive
        }
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    pub fn context(&self) -> &TurnContext {
        &self.context
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.context.snapshot(self.responding)
    }

    /// Sends the current context as a `state_update`.
    pub async fn publish_snapshot(&self) -> Result<(), TurnError> {
        self.emit(ServerEvent::snapshot(self.snapshot())).await
    }

    /// Dialogue stage label, for logs.
    pub fn stage(&self) -> String {
        self.orchestrator.stage()
    }

    pub async fn ingest_text(
        &mut self,
        text: &str,
        mode: TextMode,
        source: TextSource,
    ) -> Result<Ingest, TurnError> {
        if self.responding {
            debug!(?source, "dropping text while responding");
            return Ok(Ingest::Dropped);
        }
        if text.trim().is_empty() {
            return Ok(Ingest::Ignored);
        }
        self.process_text(text, mode, source).await
    }

    /// Adds a raw audio frame to the turn's buffer. In per-chunk mode the
    /// whole buffer is transcribed again and replaces the transcript.
    pub async fn ingest_audio_chunk(&mut self, chunk: &[u8]) -> Result<Ingest, TurnError> {
        if self.responding {
            debug!(bytes = chunk.len(), "dropping audio while responding");
            return Ok(Ingest::Dropped);
        }
        if chunk.is_empty() {
            return Ok(Ingest::Ignored);
        }

        self.audio.extend_from_slice(chunk);
        // Audio on its own counts as intent to speak.
        if self.context.activate() {
            info!("turn activated by audio");
        }

        match self.settings.audio_transcription {
            AudioTranscription::OnCommit => Ok(Ingest::Buffered),
            AudioTranscription::PerChunk => {
                let text = self.transcribe_buffered_audio().await;
                if text.trim().is_empty() {
                    return Ok(Ingest::Buffered);
                }
                self.process_text(&text, TextMode::Replace, TextSource::Audio)
                    .await
            }
        }
    }

    pub async fn ingest_image(
        &mut self,
        image: String,
        source: ImageSource,
    ) -> Result<Ingest, TurnError> {
        if self.responding {
            info!(?source, "rejecting image while responding");
            return Ok(Ingest::Dropped);
        }
        if image.is_empty() {
            return Ok(Ingest::Ignored);
        }
        self.context.push_image(image, source);
        debug!(count = self.context.images.len(), ?source, "image buffered");
        Ok(Ingest::Buffered)
    }

    /// Finalizes the current turn and streams the reply.
    ///
    /// A no-op (nothing emitted) unless the turn is active and holds
    /// content. Otherwise emits, in order: `state_update(RESPONDING)`,
    /// `commit_confirmation`, the response chunks (or one error chunk) and a
    /// closing `state_update`. The turn context is back to its default value
    /// afterwards whatever happened; only a closed event channel is returned
    /// as an error.
    pub async fn commit(&mut self) -> Result<(), TurnError> {
        if self.responding {
            debug!("commit already in flight");
            return Ok(());
        }
        if self.settings.audio_transcription == AudioTranscription::OnCommit
            && !self.audio.is_empty()
        {
            let text = self.transcribe_buffered_audio().await;
            // Each recording is transcribed once, even when nothing gets committed.
            self.audio.clear();
            if !text.trim().is_empty() {
                self.process_text(&text, TextMode::Replace, TextSource::Audio)
                    .await?;
            }
        }
        if !self.context.is_committable() {
            debug!("nothing to commit");
            return Ok(());
        }

        self.responding = true;
        let result = self.run_commit().await;
        let cleanup = self.finish_commit().await;
        result.and(cleanup)
    }

    /// Clears the turn and the conversation behind it.
    pub fn reset(&mut self) {
        self.context.reset();
        self.audio.clear();
        self.screenshot_triggered = false;
        self.orchestrator.reset();
        info!("session reset");
    }

    async fn run_commit(&mut self) -> Result<(), TurnError> {
        self.emit(ServerEvent::phase(TurnPhase::Responding)).await?;

        let prompt = self.context.combined_prompt();
        self.emit(ServerEvent::CommitConfirmation {
            text: prompt.clone(),
            images: self.context.images.clone(),
        })
        .await?;

        let images: Vec<String> = self
            .context
            .images
            .iter()
            .map(|image| strip_data_uri(image).to_string())
            .collect();
        info!(
            chars = prompt.len(),
            images = images.len(),
            sources = ?self.context.sources,
            "committing turn"
        );

        match self
            .orchestrator
            .complete_turn(&prompt, &images, &self.events)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_disconnect() => Err(e),
            Err(e) => {
                error!("Turn failed: {}", e);
                self.emit(ServerEvent::ResponseChunk(format!("Error: {e}")))
                    .await
            }
        }
    }

    async fn finish_commit(&mut self) -> Result<(), TurnError> {
        self.context.reset();
        self.audio.clear();
        self.screenshot_triggered = false;
        self.responding = false;
        self.emit(ServerEvent::phase(self.phase())).await
    }

    /// Shared path for typed and transcribed text: activation, voice
    /// commands, commit phrase, then storage.
    async fn process_text(
        &mut self,
        text: &str,
        mode: TextMode,
        source: TextSource,
    ) -> Result<Ingest, TurnError> {
        let explicit = source == TextSource::Typed;
        if (explicit || contains_wake_phrase(text)) && self.context.activate() {
            info!(?source, "turn activated");
        }
        if source == TextSource::Audio && !self.context.active {
            debug!("ignoring speech before the turn starts");
            return Ok(Ingest::Ignored);
        }

        if contains_screenshot_request(text) && !self.screenshot_triggered {
            self.screenshot_triggered = true;
            if self.settings.screenshot_commands {
                info!("screenshot requested by voice");
                self.emit(ServerEvent::Command(ClientAction::CaptureScreenshot))
                    .await?;
            } else {
                debug!("screenshot phrase detected; voice commands disabled");
            }
        }

        let (stored, commit_requested) = match strip_commit_phrase(text) {
            Some(stripped) => (stripped, true),
            None => (text, false),
        };
        self.context.store_text(stored, mode, source);

        if source == TextSource::Audio {
            self.emit(ServerEvent::TranscriptUpdate(self.context.transcript.clone()))
                .await?;
        }

        if commit_requested {
            debug!(?source, "commit phrase detected");
            Ok(Ingest::CommitRequested)
        } else {
            Ok(Ingest::Buffered)
        }
    }

    /// Transcribes everything recorded so far. Failures come back empty.
    async fn transcribe_buffered_audio(&self) -> String {
        let limit = self.settings.transcription_timeout;
        let call = self
            .transcriber
            .transcribe(&self.audio, &self.settings.language_hint);
        match timeout(limit, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Transcription failed: {:#}", e);
                String::new()
            }
            Err(_) => {
                warn!(
                    "Transcription timed out after {}s ({} bytes buffered)",
                    limit.as_secs(),
                    self.audio.len()
                );
                String::new()
            }
        }
    }

    async fn emit(&self, event: ServerEvent) -> Result<(), TurnError> {
        self.events
            .send(event)
            .await
            .map_err(|_| TurnError::EventChannelClosed)
    }
}
