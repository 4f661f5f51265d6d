//! Turn aggregation and dialogue progression for the Essence evaluation agent.
//!
//! Nothing in here knows about sockets. A transport feeds client input into a
//! [`TurnManager`] and forwards the [`ServerEvent`]s it emits.

pub mod conversation;
pub mod error;
pub mod events;
pub mod generator;
pub mod llm;
pub mod orchestrator;
pub mod settings;
pub mod summarizer;
pub mod transcriber;
pub mod triggers;
pub mod turn_context;
pub mod turn_manager;

pub use conversation::{Conversation, DialoguePolicy, PolicyKind};
pub use error::TurnError;
pub use events::{ClientMessage, ServerEvent, TurnPhase};
pub use generator::{ChatGenerator, Generator};
pub use llm::LlmClient;
pub use orchestrator::Orchestrator;
pub use settings::{AudioTranscription, GenerationSettings, TurnSettings};
pub use summarizer::{ChatSummarizer, NoopSummarizer, Summarizer};
pub use transcriber::{Transcriber, WhisperTranscriber};
pub use turn_manager::{Ingest, TurnManager};
