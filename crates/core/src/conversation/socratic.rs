//! Open-ended examiner: no fixed question list, five coarse stages driven by
//! keywords in the user's replies.

use super::DialoguePolicy;
use super::history::History;

const PRESENTATION_DONE_PHRASES: [&str; 10] = [
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
const CONFIRMATION_WORDS: [&str; 7] = ["yes", "correct", "right", "yeah", "exactly", "sure", "ok"];
const STOP_WORDS: [&str; 4] = ["enough", "stop", "satisfied", "done"];

/// Cross-questioning turns before the user is offered a way out.
const CROSS_QUESTION_ROUNDS: u32 = 4;

const BASE_INSTRUCTION: &str = "You are Essence, an expert technical interviewer and examiner.\n\
Your goal is to EVALUATE the user's knowledge of the project they are showing.\n\
You are not a coding assistant. Never offer to write code.\n\
Conduct yourself like a professor or senior engineer running a viva voce.\n\n\
CRITICAL RULES:\n\
1. Ask ONLY ONE question per turn. Never add a second one.\n\
2. No 'Also, ...' or 'And one more thing...' questions.\n\
3. Keep responses concise: under 3 sentences unless summarizing.\n\
4. After asking your question, STOP and wait for the answer.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocraticState {
    #[default]
    PassiveListening,
    Alignment,
    KnowledgeGathering,
    CrossQuestioning,
    SatisfactionCheck,
}

#[derive(Debug, Default)]
pub struct SocraticPolicy {
    state: SocraticState,
    topic_depth: u32,
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

impl SocraticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SocraticState {
        self.state
    }

    fn stage_instruction(&self, has_image: bool) -> &'static str {
        match self.state {
            SocraticState::PassiveListening if has_image => "STATE: PASSIVE_LISTENING (the user is presenting)\n\
- The user is showing you their code or project. Listen actively; no questions yet.\n\
- While they are still explaining, reply with short acknowledgements ('I see', 'Okay', 'Go on').\n\
- Quietly note goals, features and gaps.\n\
- Only when the user clearly says they are done, switch to summarizing their project.\n",
            SocraticState::PassiveListening => "STATE: PASSIVE_LISTENING (waiting for context)\n\
- The user has not shared a screen yet or is only talking.\n\
- Encourage them to show the project or explain more.\n",
            SocraticState::Alignment => "STATE: ALIGNMENT (confirming understanding)\n\
- Summarize what you understood about the project in 1-2 sentences.\n\
- Ask the user to confirm whether that understanding is correct.\n\
- No technical questions yet; if something is unclear, ask ONE simple question.\n",
            SocraticState::KnowledgeGathering => "STATE: KNOWLEDGE_GATHERING (foundational questions)\n\
- Ask EXACTLY ONE foundational question about the problem, the users or the core features.\n\
- Keep the tone neutral and non-challenging.\n",
            SocraticState::CrossQuestioning => "STATE: CROSS_QUESTIONING (deep dive)\n\
- Evaluate the user's previous answer.\n\
- If it was clear, move to a new related topic.\n\
- If it was vague or partial, follow up or challenge an assumption.\n\
- If it revealed a gap, ask about edge cases or trade-offs.\n\
- Ask EXACTLY ONE focused question.\n",
            SocraticState::SatisfactionCheck => "STATE: SATISFACTION_CHECK\n\
- Ask: 'Are you satisfied with the depth of questions so far?'\n\
- If they say yes, summarize your insights.\n\
- If not, acknowledge it and ask which topic to cover next.\n",
        }
    }
}

impl DialoguePolicy for SocraticPolicy {
    fn select_instruction(&mut self, _user_input: &str, has_image: bool) -> String {
        format!("{BASE_INSTRUCTION}\n{}", self.stage_instruction(has_image))
    }

    fn apply_transition(&mut self, user_input: &str, _ai_response: &str, history: &mut History) {
        let user = user_input.to_lowercase();
        match self.state {
            SocraticState::PassiveListening => {
                if contains_any(&user, &PRESENTATION_DONE_PHRASES) {
                    self.state = SocraticState::Alignment;
                }
            }
            SocraticState::Alignment => {
                if contains_any(&user, &CONFIRMATION_WORDS) {
                    self.state = SocraticState::KnowledgeGathering;
                }
            }
            SocraticState::KnowledgeGathering => {
                // One foundational exchange on record is enough.
                if history.len() > 2 {
                    self.state = SocraticState::CrossQuestioning;
                    self.topic_depth = 0;
                }
            }
            SocraticState::CrossQuestioning => {
                self.topic_depth += 1;
                if self.topic_depth >= CROSS_QUESTION_ROUNDS || contains_any(&user, &STOP_WORDS) {
                    self.state = SocraticState::SatisfactionCheck;
                    self.topic_depth = 0;
                }
            }
            SocraticState::SatisfactionCheck => {
                if user.contains("yes") {
                    self.state = SocraticState::PassiveListening;
                    history.clear();
                } else if user.contains("no") {
                    self.state = SocraticState::CrossQuestioning;
                }
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn stage(&self) -> String {
        format!("{:?}", self.state)
    }
}
