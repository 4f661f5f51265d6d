//! The fixed ten-question interview.
//!
//! The policy is split into two pure steps over an [`InterviewProgress`]:
//! [`plan`] runs before generation and picks a [`Directive`], [`advance`] runs
//! once the full model response is known. Whether a core question was asked is
//! decided by verbatim (normalized) substring matching against the pinned
//! question text, never by interpretation.

use super::history::History;
use super::prompts;
use super::questions::EVALUATION_QUESTIONS;
use super::DialoguePolicy;

/// Follow-ups allowed per core question before the interview moves on regardless.
pub const MAX_FOLLOW_UPS: u8 = 2;

/// Any of these in the user's input means the presentation is over.
pub const DONE_EXPLAINING_PHRASES: [&str; 10] = [
    "that's it",
    "that is it",
    "that's all",
    "that is all",
    "done explaining",
    "finished explaining",
    "what do you think",
    "ready for questions",
    "basically it",
    "started",
];

/// Words in an answer that suggest a screenshot would help.
pub const VISUAL_KEYWORDS: [&str; 13] = [
    "ui",
    "interface",
    "visual",
    "output",
    "dashboard",
    "screen",
    "result",
    "chart",
    "page",
    "display",
    "view",
    "look",
    "appearance",
];

/// Present in a response that asked the user for screenshots.
pub const SCREENSHOT_PROMPT_MARKER: &str = "share relevant screenshots";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    PassiveListening,
    Evaluation,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterviewProgress {
    pub state: ConversationState,
    /// `None` until the evaluation starts; reaches the question count when it completes.
    pub question_index: Option<usize>,
    pub follow_up_count: u8,
    pub last_ai_question_was_screenshot_prompt: bool,
}

/// What the model is told to do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    AcknowledgePresentation,
    RequestScreenshot { question: usize },
    AdaptiveFollowUp { answered: usize, next: usize, follow_ups: u8 },
    AskExactly { question: usize },
    SummarizeAndClose,
}

pub fn signals_done_explaining(user_input: &str) -> bool {
    let lower = user_input.to_lowercase();
    DONE_EXPLAINING_PHRASES.iter().any(|p| lower.contains(p))
}

fn mentions_visuals(user_input: &str) -> bool {
    let lower = user_input.to_lowercase();
    VISUAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Lowercases, drops ASCII punctuation and collapses runs of whitespace to a
/// single space. Non-ASCII marks such as `’` are kept.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pre-turn step: may start the evaluation, then chooses the directive.
pub fn plan(progress: &InterviewProgress, user_input: &str) -> (InterviewProgress, Directive) {
    let mut next = progress.clone();
    if next.state == ConversationState::PassiveListening && signals_done_explaining(user_input) {
        next.state = ConversationState::Evaluation;
        next.question_index = Some(0);
    }

    let directive = match (next.state, next.question_index) {
        (ConversationState::PassiveListening, _) => Directive::AcknowledgePresentation,
        (ConversationState::Evaluation, Some(index)) if index < EVALUATION_QUESTIONS.len() => {
            let pinned = &EVALUATION_QUESTIONS[index];
            if pinned.screenshot_relevant
                && !next.last_ai_question_was_screenshot_prompt
                && mentions_visuals(user_input)
            {
                Directive::RequestScreenshot { question: index }
            } else if index > 0 && next.follow_up_count < MAX_FOLLOW_UPS {
                Directive::AdaptiveFollowUp {
                    answered: index - 1,
                    next: index,
                    follow_ups: next.follow_up_count,
                }
            } else {
                Directive::AskExactly { question: index }
            }
        }
        _ => Directive::SummarizeAndClose,
    };

    (next, directive)
}

/// Post-turn step: decides from the model's full response whether the pinned
/// question was asked.
pub fn advance(progress: &InterviewProgress, ai_response: &str) -> InterviewProgress {
    let mut next = progress.clone();
    if next.state != ConversationState::Evaluation {
        return next;
    }
    let Some(mut index) = next.question_index else {
        return next;
    };

    if ai_response.to_lowercase().contains(SCREENSHOT_PROMPT_MARKER) {
        next.last_ai_question_was_screenshot_prompt = true;
        return next;
    }

    let asked = EVALUATION_QUESTIONS
        .get(index)
        .is_some_and(|q| normalize(ai_response).contains(&normalize(q.text)));

    if asked {
        index += 1;
        next.follow_up_count = 0;
    } else {
        next.follow_up_count += 1;
        if next.follow_up_count >= MAX_FOLLOW_UPS {
            index += 1;
            next.follow_up_count = 0;
        }
    }
    next.last_ai_question_was_screenshot_prompt = false;
    next.question_index = Some(index);

    if index >= EVALUATION_QUESTIONS.len() {
        next.state = ConversationState::Completed;
    }
    next
}

/// Stateful wrapper that plugs the interview into a `Conversation`.
#[derive(Debug, Default)]
pub struct InterviewPolicy {
    progress: InterviewProgress,
}

impl InterviewPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> &InterviewProgress {
        &self.progress
    }
}

impl DialoguePolicy for InterviewPolicy {
    fn select_instruction(&mut self, user_input: &str, _has_image: bool) -> String {
        let (next, directive) = plan(&self.progress, user_input);
        if next.state != self.progress.state {
            tracing::info!("User finished presenting; starting the evaluation.");
        }
        self.progress = next;
        tracing::debug!(?directive, "Interview directive selected");
        prompts::interview_instruction(&directive)
    }

    fn apply_transition(&mut self, _user_input: &str, ai_response: &str, _history: &mut History) {
        self.progress = advance(&self.progress, ai_response);
    }

    fn reset(&mut self) {
        self.progress = InterviewProgress::default();
    }

    fn stage(&self) -> String {
        let p = &self.progress;
        match (p.state, p.question_index) {
            (ConversationState::Evaluation, Some(i)) => {
                format!("evaluation q{} (follow-ups: {})", i + 1, p.follow_up_count)
            }
            (ConversationState::Evaluation, None) => "evaluation".to_string(),
            (ConversationState::PassiveListening, _) => "passive_listening".to_string(),
            (ConversationState::Completed, _) => "completed".to_string(),
        }
    }
}
