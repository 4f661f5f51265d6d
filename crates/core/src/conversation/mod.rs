pub mod history;
pub mod interview;
pub mod prompts;
pub mod questions;
pub mod socratic;

use history::{History, Message};
use interview::InterviewPolicy;
use socratic::SocraticPolicy;

/// A dialogue strategy: which instruction to give the model before a turn,
/// and how to move on once the model's full reply is known.
pub trait DialoguePolicy: Send + Sync {
    /// Called before generation. May itself change state.
    fn select_instruction(&mut self, user_input: &str, has_image: bool) -> String;

    /// Called after generation with the complete response. The exchange is
    /// already in `history`.
    fn apply_transition(&mut self, user_input: &str, ai_response: &str, history: &mut History);

    fn reset(&mut self);

    /// Short description of where the dialogue stands, for logs.
    fn stage(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Interview,
    Socratic,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn DialoguePolicy> {
        match self {
            PolicyKind::Interview => Box::new(InterviewPolicy::new()),
            PolicyKind::Socratic => Box::new(SocraticPolicy::new()),
        }
    }
}

/// One session's dialogue: the active policy plus the history it is judged against.
pub struct Conversation {
    policy: Box<dyn DialoguePolicy>,
    history: History,
}

impl Conversation {
    pub fn new(policy: Box<dyn DialoguePolicy>) -> Self {
        Self {
            policy,
            history: History::new(),
        }
    }

    pub fn select_instruction(&mut self, user_input: &str, has_image: bool) -> String {
        self.policy.select_instruction(user_input, has_image)
    }

    /// Records the finished exchange, then lets the policy transition.
    pub fn complete_exchange(&mut self, user_input: &str, ai_response: &str) {
        self.history.record_exchange(user_input, ai_response);
        self.policy
            .apply_transition(user_input, ai_response, &mut self.history);
    }

    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn stage(&self) -> String {
        self.policy.stage()
    }

    pub fn reset(&mut self) {
        self.policy.reset();
        self.history.clear();
    }
}
