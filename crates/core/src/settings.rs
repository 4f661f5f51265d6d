use std::time::Duration;

/// How raw audio frames turn into transcript text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioTranscription {
    /// Re-transcribe the whole accumulated buffer on every frame.
    #[default]
    PerChunk,
    /// Only buffer frames; transcribe the whole buffer right before an explicit commit.
    OnCommit,
}

/// Per-session knobs for the `TurnManager`.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub audio_transcription: AudioTranscription,
    pub language_hint: String,
    pub screenshot_commands: bool,
    pub transcription_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            audio_transcription: AudioTranscription::default(),
            language_hint: "en".to_string(),
            screenshot_commands: false,
            transcription_timeout: Duration::from_secs(30),
        }
    }
}

/// Bounds on a single generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    /// Longest wait for the stream to open or for the next chunk.
    pub idle_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}
