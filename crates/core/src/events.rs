//! Wire types exchanged with a session's client.
//!
//! Client frames are JSON objects tagged by `type`; server events are
//! `{"type": ..., "payload": ...}`. Raw audio travels as binary frames and has
//! no type here.

use crate::turn_context::{ImageSource, Sources, TextMode};
use serde::{Deserialize, Serialize};

/// Commands a client sends as JSON text frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TextInput {
        text: String,
        #[serde(default = "default_text_mode")]
        mode: TextMode,
    },
    ImageInput {
        image: String,
        #[serde(default)]
        source: ImageSource,
    },
    Commit,
    Reset,
}

fn default_text_mode() -> TextMode {
    TextMode::Append
}

impl ClientMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::TextInput { .. } => "text_input",
            ClientMessage::ImageInput { .. } => "image_input",
            ClientMessage::Commit => "commit",
            ClientMessage::Reset => "reset",
        }
    }
}

/// Events the server pushes to the client, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    StateUpdate(StatePayload),
    CommitConfirmation { text: String, images: Vec<String> },
    ResponseChunk(String),
    TranscriptUpdate(String),
    Command(ClientAction),
}

impl ServerEvent {
    pub fn phase(phase: TurnPhase) -> Self {
        ServerEvent::StateUpdate(StatePayload::Phase(phase))
    }

    pub fn snapshot(snapshot: ContextSnapshot) -> Self {
        ServerEvent::StateUpdate(StatePayload::Snapshot(snapshot))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatePayload {
    Phase(TurnPhase),
    Snapshot(ContextSnapshot),
}

/// Lifecycle of the turn owned by a `TurnManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    Inactive,
    Active,
    Responding,
}

/// Actions the client is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    CaptureScreenshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub active: bool,
    pub transcript: String,
    pub typed_text: String,
    pub has_screenshot: bool,
    pub image_count: usize,
    pub sources: Sources,
    pub is_responding: bool,
}
