//! One WebSocket connection, one `TurnManager`.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use essence_core::conversation::{Conversation, PolicyKind};
use essence_core::turn_context::TextSource;
use essence_core::{
    ChatSummarizer, ClientMessage, GenerationSettings, Generator, Ingest, LlmClient,
    NoopSummarizer, Orchestrator, ServerEvent, Summarizer, Transcriber, TurnError, TurnManager,
    TurnSettings,
};
use futures::{SinkExt, Stream, StreamExt, future};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;

/// A decoded client frame.
#[derive(Debug)]
pub enum Inbound {
    Command(ClientMessage),
    Audio(Bytes),
    /// A text frame that is not a known command; carries the parse error.
    Malformed(String),
}

impl Inbound {
    /// `None` for control frames.
    pub fn decode(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(match serde_json::from_str(text.as_str()) {
                Ok(command) => Inbound::Command(command),
                Err(e) => Inbound::Malformed(e.to_string()),
            }),
            Message::Binary(bytes) => Some(Inbound::Audio(bytes)),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
        }
    }
}

/// Everything needed to start a session. Clients are shared; each session
/// gets its own conversation and summarizer.
#[derive(Clone)]
pub struct SessionFactory {
    pub generator: Arc<dyn Generator>,
    pub transcriber: Arc<dyn Transcriber>,
    /// Client and model for background summaries, if enabled.
    pub memory: Option<(LlmClient, String)>,
    pub policy: PolicyKind,
    pub turn: TurnSettings,
    pub generation: GenerationSettings,
}

impl SessionFactory {
    pub fn build(&self, events: mpsc::Sender<ServerEvent>) -> TurnManager {
        let summarizer: Arc<dyn Summarizer> = match &self.memory {
            Some((client, model)) => Arc::new(ChatSummarizer::new(client.clone(), model.clone())),
            None => Arc::new(NoopSummarizer),
        };
        let orchestrator = Orchestrator::new(
            Conversation::new(self.policy.build()),
            Arc::clone(&self.generator),
            summarizer,
            self.generation,
        );
        TurnManager::new(
            orchestrator,
            Arc::clone(&self.transcriber),
            self.turn.clone(),
            events,
        )
    }
}

/// Serves one connection until the client leaves.
pub async fn run(socket: WebSocket, factory: SessionFactory) {
    let span = info_span!("session", id = %Uuid::new_v4());
    async move {
        info!("session started");
        let (mut sink, stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);

        let writer = tokio::spawn(
            async move {
                while let Some(event) = rx.recv().await {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        debug!("socket closed while sending: {}", e);
                        break;
                    }
                }
            }
            .in_current_span(),
        );

        let inbound = stream
            .take_while(|frame| match frame {
                Ok(Message::Close(_)) => future::ready(false),
                Ok(_) => future::ready(true),
                Err(e) => {
                    info!("WebSocket error: {}", e);
                    future::ready(false)
                }
            })
            .filter_map(|frame| future::ready(frame.ok().and_then(Inbound::decode)))
            .boxed();

        let mut manager = factory.build(tx);
        match drive(&mut manager, inbound).await {
            Ok(()) => info!("client disconnected"),
            Err(e) => info!("session ended: {}", e),
        }
        let stage = manager.stage();
        drop(manager);

        if let Err(e) = writer.await {
            error!("Writer task failed: {}", e);
        }
        info!(%stage, "session closed");
    }
    .instrument(span)
    .await
}

/// Feeds client input into `manager` until the input ends.
///
/// Returns an error only when the event channel has closed.
pub async fn drive<S>(manager: &mut TurnManager, mut inbound: S) -> Result<(), TurnError>
where
    S: Stream<Item = Inbound> + Unpin,
{
    while let Some(message) = inbound.next().await {
        let (commit, is_command) = match message {
            Inbound::Audio(bytes) => (
                manager.ingest_audio_chunk(&bytes).await? == Ingest::CommitRequested,
                false,
            ),
            Inbound::Malformed(e) => {
                warn!("Ignoring malformed message: {}", e);
                continue;
            }
            Inbound::Command(command) => {
                debug!(kind = command.kind(), "command received");
                let commit = match command {
                    ClientMessage::TextInput { text, mode } => {
                        manager.ingest_text(&text, mode, TextSource::Typed).await?
                            == Ingest::CommitRequested
                    }
                    ClientMessage::ImageInput { image, source } => {
                        manager.ingest_image(image, source).await?;
                        false
                    }
                    ClientMessage::Commit => true,
                    ClientMessage::Reset => {
                        manager.reset();
                        false
                    }
                };
                (commit, true)
            }
        };

        let mut reset = false;
        if commit {
            let outcome = commit_draining(manager, &mut inbound).await?;
            if outcome.disconnected {
                return Ok(());
            }
            if outcome.reset_requested {
                manager.reset();
                reset = true;
            }
        }
        if is_command || reset {
            manager.publish_snapshot().await?;
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct DrainOutcome {
    reset_requested: bool,
    disconnected: bool,
}

/// Runs a commit while still reading the socket. Input that arrives in the
/// meantime is dropped, a reset is held until the commit ends, and a
/// disconnect lets the commit finish its cleanup first.
async fn commit_draining<S>(
    manager: &mut TurnManager,
    inbound: &mut S,
) -> Result<DrainOutcome, TurnError>
where
    S: Stream<Item = Inbound> + Unpin,
{
    let mut outcome = DrainOutcome::default();
    let commit = manager.commit();
    tokio::pin!(commit);

    let result = loop {
        tokio::select! {
            biased;
            result = &mut commit => break result,
            next = inbound.next(), if !outcome.disconnected => match next {
                None => {
                    info!("client left mid-commit; finishing the turn first");
                    outcome.disconnected = true;
                }
                Some(Inbound::Command(ClientMessage::Reset)) => {
                    debug!("reset deferred until the commit finishes");
                    outcome.reset_requested = true;
                }
                Some(Inbound::Command(ClientMessage::Commit)) => {
                    debug!("ignoring commit while responding");
                }
                Some(Inbound::Command(command)) => {
                    debug!(kind = command.kind(), "dropping input while responding");
                }
                Some(Inbound::Audio(bytes)) => {
                    debug!(bytes = bytes.len(), "dropping audio while responding");
                }
                Some(Inbound::Malformed(e)) => {
                    warn!("Ignoring malformed message: {}", e);
                }
            },
        }
    };

    result.map(|()| outcome)
}
