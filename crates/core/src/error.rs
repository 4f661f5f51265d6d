use std::time::Duration;

/// Failures that can surface from a turn.
///
/// Dropped input and transcription problems never show up here: they are
/// logged and absorbed where they happen. A `Generation` or
/// `GenerationTimeout` error is turned into an error chunk by the
/// `TurnManager`; only `EventChannelClosed` ends a session.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("event channel closed; the client is gone")]
    EventChannelClosed,
    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),
    #[error("generation stalled for more than {}s", .0.as_secs())]
    GenerationTimeout(Duration),
}

impl TurnError {
    /// Whether the error means the session can no longer talk to its client.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TurnError::EventChannelClosed)
    }
}
