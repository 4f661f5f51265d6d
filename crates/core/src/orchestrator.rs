use crate::conversation::Conversation;
use crate::conversation::history::Message;
use crate::error::TurnError;
use crate::events::ServerEvent;
use crate::generator::{GenerationRequest, Generator};
use crate::settings::GenerationSettings;
use crate::summarizer::{MemorySnapshot, Summarizer};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, warn};

/// Runs one committed turn: policy instruction, generation, bookkeeping.
pub struct Orchestrator {
    conversation: Conversation,
    generator: Arc<dyn Generator>,
    summarizer: Arc<dyn Summarizer>,
    settings: GenerationSettings,
}

impl Orchestrator {
    pub fn new(
        conversation: Conversation,
        generator: Arc<dyn Generator>,
        summarizer: Arc<dyn Summarizer>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            conversation,
            generator,
            summarizer,
            settings,
        }
    }

    /// Generates the reply to `prompt`, forwarding every chunk to `events`
    /// as a `response_chunk`, and returns the full text.
    ///
    /// The exchange is recorded and the policy transitions only when the
    /// stream finishes cleanly. `images` must already be raw base64.
    pub async fn complete_turn(
        &mut self,
        prompt: &str,
        images: &[String],
        events: &mpsc::Sender<ServerEvent>,
    ) -> Result<String, TurnError> {
        let system_instruction = self
            .conversation
            .select_instruction(prompt, !images.is_empty());
        let request = GenerationRequest {
            system_instruction,
            history: self.conversation.history().to_vec(),
            prompt_text: prompt.to_string(),
            images: images.to_vec(),
            summary: self.summarizer.summary(),
        };
        debug!(stage = %self.conversation.stage(), "starting generation");

        let idle = self.settings.idle_timeout;
        let mut stream = timeout(idle, self.generator.stream(request))
            .await
            .map_err(|_| TurnError::GenerationTimeout(idle))?
            .map_err(TurnError::Generation)?;

        let mut full_response = String::new();
        loop {
            let chunk = match timeout(idle, stream.next()).await {
                Err(_) => return Err(TurnError::GenerationTimeout(idle)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(TurnError::Generation(e)),
                Ok(Some(Ok(chunk))) => chunk,
            };
            full_response.push_str(&chunk);
            events
                .send(ServerEvent::ResponseChunk(chunk))
                .await
                .map_err(|_| TurnError::EventChannelClosed)?;
        }

        self.conversation.complete_exchange(prompt, &full_response);
        info!(
            stage = %self.conversation.stage(),
            chars = full_response.len(),
            "turn complete"
        );

        self.spawn_memory_update(MemorySnapshot::new(prompt, images.len()));
        Ok(full_response)
    }

    // Never awaited; the turn is already finished from the user's side.
    fn spawn_memory_update(&self, snapshot: MemorySnapshot) {
        let summarizer = Arc::clone(&self.summarizer);
        tokio::spawn(
            async move {
                if let Err(e) = summarizer.update(snapshot).await {
                    warn!("Memory update failed: {:#}", e);
                }
            }
            .in_current_span(),
        );
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.history()
    }

    pub fn stage(&self) -> String {
        self.conversation.stage()
    }

    pub fn reset(&mut self) {
        self.conversation.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::PolicyKind;
    use crate::conversation::questions::EVALUATION_QUESTIONS;
    use crate::generator::{ChunkStream, MockGenerator};
    use crate::summarizer::{MockSummarizer, NoopSummarizer};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a queued script, one reply per turn, split into words.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedGenerator {
        fn new<I: IntoIterator<Item = String>>(replies: I) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn stream(&self, _request: GenerationRequest) -> anyhow::Result<ChunkStream> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("script exhausted"))?;
            let chunks: Vec<anyhow::Result<String>> = reply
                .split_inclusive(' ')
                .map(|piece| Ok(piece.to_string()))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    fn orchestrator(generator: Arc<dyn Generator>) -> Orchestrator {
        Orchestrator::new(
            Conversation::new(PolicyKind::Interview.build()),
            generator,
            Arc::new(NoopSummarizer),
            GenerationSettings::default(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn chunks_are_forwarded_in_order_and_recorded() {
        let generator = ScriptedGenerator::new(["I see. Go on.".to_string()]);
        let mut orchestrator = orchestrator(Arc::new(generator));
        let (tx, mut rx) = mpsc::channel(16);

        let reply = orchestrator
            .complete_turn("here is my app", &[], &tx)
            .await
            .unwrap();
        assert_eq!(reply, "I see. Go on.");

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ServerEvent::ResponseChunk("I ".to_string()),
                ServerEvent::ResponseChunk("see. ".to_string()),
                ServerEvent::ResponseChunk("Go ".to_string()),
                ServerEvent::ResponseChunk("on.".to_string()),
            ]
        );
        assert_eq!(orchestrator.history().len(), 2);
        assert_eq!(orchestrator.history()[0].content, "here is my app");
    }

    #[tokio::test]
    async fn request_carries_instruction_history_summary_and_images() {
        let mut generator = MockGenerator::new();
        generator
            .expect_stream()
            .withf(|request| {
                request.system_instruction.contains("PASSIVE_LISTENING")
                    && request.history.is_empty()
                    && request.prompt_text == "look at my dashboard"
                    && request.images == vec!["AAAA".to_string()]
                    && request.summary == "earlier: auth flow"
            })
            .times(1)
            .returning(|_| Ok(stream::iter(vec![Ok("Okay.".to_string())]).boxed()));

        let mut summarizer = MockSummarizer::new();
        summarizer
            .expect_summary()
            .return_const("earlier: auth flow".to_string());
        summarizer.expect_update().returning(|_| Ok(()));

        let mut orchestrator = Orchestrator::new(
            Conversation::new(PolicyKind::Interview.build()),
            Arc::new(generator),
            Arc::new(summarizer),
            GenerationSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(16);
        let reply = orchestrator
            .complete_turn("look at my dashboard", &["AAAA".to_string()], &tx)
            .await
            .unwrap();
        assert_eq!(reply, "Okay.");
    }

    #[tokio::test]
    async fn failure_mid_stream_records_nothing() {
        let mut generator = MockGenerator::new();
        generator.expect_stream().returning(|_| {
            Ok(stream::iter(vec![
                Ok("Partial ".to_string()),
                Err(anyhow!("connection reset")),
            ])
            .boxed())
        });
        let mut orchestrator = orchestrator(Arc::new(generator));
        let (tx, mut rx) = mpsc::channel(16);

        let err = orchestrator
            .complete_turn("that's it", &[], &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(_)));
        assert!(orchestrator.history().is_empty());
        // The chunk that made it out before the failure was still forwarded.
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn failure_to_open_the_stream_is_a_generation_error() {
        let mut generator = MockGenerator::new();
        generator
            .expect_stream()
            .returning(|_| Err(anyhow!("401 unauthorized")));
        let mut orchestrator = orchestrator(Arc::new(generator));
        let (tx, _rx) = mpsc::channel(16);

        let err = orchestrator.complete_turn("hello", &[], &tx).await.unwrap_err();
        assert!(err.to_string().contains("generation failed"));
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let mut generator = MockGenerator::new();
        generator
            .expect_stream()
            .returning(|_| Ok(stream::pending::<anyhow::Result<String>>().boxed()));
        let mut orchestrator = Orchestrator::new(
            Conversation::new(PolicyKind::Interview.build()),
            Arc::new(generator),
            Arc::new(NoopSummarizer),
            GenerationSettings {
                idle_timeout: Duration::from_millis(20),
            },
        );
        let (tx, _rx) = mpsc::channel(16);

        let err = orchestrator.complete_turn("hello", &[], &tx).await.unwrap_err();
        assert!(matches!(err, TurnError::GenerationTimeout(_)));
        assert!(orchestrator.history().is_empty());
    }

    #[tokio::test]
    async fn closed_event_channel_is_a_disconnect() {
        let generator = ScriptedGenerator::new(["Hello there".to_string()]);
        let mut orchestrator = orchestrator(Arc::new(generator));
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let err = orchestrator.complete_turn("hi", &[], &tx).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn ten_verbatim_questions_complete_the_interview() {
        let replies = EVALUATION_QUESTIONS
            .iter()
            .map(|q| q.text.to_string())
            .chain(["Thanks, that concludes the evaluation.".to_string()]);
        let mut orchestrator = orchestrator(Arc::new(ScriptedGenerator::new(replies)));
        let (tx, mut rx) = mpsc::channel(256);

        orchestrator
            .complete_turn("That's basically it for the auth flow.", &[], &tx)
            .await
            .unwrap();
        assert_eq!(orchestrator.stage(), "evaluation q2 (follow-ups: 0)");

        for answer in 1..EVALUATION_QUESTIONS.len() {
            orchestrator
                .complete_turn(&format!("answer number {answer}"), &[], &tx)
                .await
                .unwrap();
            drain(&mut rx);
        }
        assert_eq!(orchestrator.stage(), "completed");

        orchestrator.complete_turn("thanks", &[], &tx).await.unwrap();
        assert_eq!(orchestrator.stage(), "completed");

        orchestrator.reset();
        assert_eq!(orchestrator.stage(), "passive_listening");
        assert!(orchestrator.history().is_empty());
    }

    struct RecordingSummarizer {
        tx: mpsc::UnboundedSender<MemorySnapshot>,
    }

    #[async_trait]
    impl Summarizer for RecordingSummarizer {
        fn summary(&self) -> String {
            String::new()
        }

        async fn update(&self, snapshot: MemorySnapshot) -> anyhow::Result<()> {
            self.tx.send(snapshot).ok();
            Err(anyhow!("memory model unavailable"))
        }
    }

    #[tokio::test]
    async fn memory_update_is_dispatched_and_its_failure_is_invisible() {
        let (snap_tx, mut snap_rx) = mpsc::unbounded_channel();
        let mut orchestrator = Orchestrator::new(
            Conversation::new(PolicyKind::Interview.build()),
            Arc::new(ScriptedGenerator::new([
                "Okay.".to_string(),
                "Go on.".to_string(),
            ])),
            Arc::new(RecordingSummarizer { tx: snap_tx }),
            GenerationSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(16);

        orchestrator
            .complete_turn("my dashboard", &["AAAA".to_string(), "BBBB".to_string()], &tx)
            .await
            .unwrap();
        let snapshot = snap_rx.recv().await.unwrap();
        assert_eq!(snapshot.prompt_text, "my dashboard");
        assert!(snapshot.has_images);
        assert_eq!(snapshot.image_count, 2);

        // The failed update does not affect the next turn.
        let reply = orchestrator.complete_turn("next", &[], &tx).await.unwrap();
        assert_eq!(reply, "Go on.");
    }
}
