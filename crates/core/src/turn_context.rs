use crate::events::ContextSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How new text combines with what a modality already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    Replace,
    Append,
}

/// Where a piece of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Transcribed speech.
    Audio,
    /// Typed by the user.
    Typed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Shared,
    #[default]
    Pasted,
}

/// Which modalities contributed to the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Sources {
    pub audio: bool,
    pub text: bool,
    pub image: bool,
}

/// Everything the user has said, typed or shown since the last commit.
///
/// There is exactly one per session. `reset` brings it back to
/// `TurnContext::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnContext {
    pub active: bool,
    pub transcript: String,
    pub typed_text: String,
    /// Images as supplied (data-URI prefix intact), in arrival order.
    pub images: Vec<String>,
    pub image_source: Option<ImageSource>,
    pub sources: Sources,
    /// When the turn became active.
    pub started_at: Option<DateTime<Utc>>,
}

impl TurnContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Marks the turn active. Returns `true` if it was not active before.
    pub fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.started_at = Some(Utc::now());
        true
    }

    /// Writes `text` into the buffer of `source` and marks that modality present.
    pub fn store_text(&mut self, text: &str, mode: TextMode, source: TextSource) {
        let buffer = match source {
            TextSource::Audio => {
                self.sources.audio = true;
                &mut self.transcript
            }
            TextSource::Typed => {
                self.sources.text = true;
                &mut self.typed_text
            }
        };
        match mode {
            TextMode::Replace => {
                buffer.clear();
                buffer.push_str(text);
            }
            TextMode::Append => {
                if text.is_empty() {
                    return;
                }
                if !buffer.is_empty() {
                    buffer.push(' ');
                }
                buffer.push_str(text);
            }
        }
    }

    pub fn push_image(&mut self, image: String, source: ImageSource) {
        self.images.push(image);
        self.image_source = Some(source);
        self.sources.image = true;
        self.activate();
    }

    pub fn has_content(&self) -> bool {
        !self.transcript.trim().is_empty()
            || !self.typed_text.trim().is_empty()
            || !self.images.is_empty()
    }

    pub fn is_committable(&self) -> bool {
        self.active && self.has_content()
    }

    /// Spoken and typed text joined into one prompt.
    pub fn combined_prompt(&self) -> String {
        format!("{} {}", self.transcript, self.typed_text)
            .trim()
            .to_string()
    }

    pub fn snapshot(&self, is_responding: bool) -> ContextSnapshot {
        ContextSnapshot {
            active: self.active,
            transcript: self.transcript.clone(),
            typed_text: self.typed_text.clone(),
            has_screenshot: !self.images.is_empty(),
            image_count: self.images.len(),
            sources: self.sources,
            is_responding,
        }
    }
}

/// Drops a `data:<mime>;base64,` prefix, leaving the raw payload.
pub fn strip_data_uri(image: &str) -> &str {
    match image.split_once(',') {
        Some((_, payload)) => payload,
        None => image,
    }
}
