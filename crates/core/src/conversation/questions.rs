/// One of the fixed interview questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationQuestion {
    pub section: &'static str,
    pub text: &'static str,
    /// Answers to this question may be clearer with a screenshot of the running project.
    pub screenshot_relevant: bool,
}

const fn question(
    section: &'static str,
    text: &'static str,
    screenshot_relevant: bool,
) -> EvaluationQuestion {
    EvaluationQuestion {
        section,
        text,
        screenshot_relevant,
    }
}

const PROBLEM: &str = "Problem Understanding & Intent";
const FLOW: &str = "Application Flow & System Thinking";
const STACK: &str = "Technical Approach & Stack";
const QUALITY: &str = "Functionality, Outputs & Quality";
const MATURITY: &str = "Trade-offs, Security & Maturity";

/// Five sections, two questions each, asked in this order.
pub const EVALUATION_QUESTIONS: [EvaluationQuestion; 10] = [
    question(
        PROBLEM,
        "What problem does this project solve, and who is it for?",
        false,
    ),
    question(
        PROBLEM,
        "What exactly did you build to address that problem and what are the main features?",
        false,
    ),
    question(
        FLOW,
        "Walk me through the application from a user’s perspective.",
        false,
    ),
    question(
        FLOW,
        "What happens behind the scenes when the user interacts with it?",
        false,
    ),
    question(
        STACK,
        "What technical approach and tech stack did you choose, and why?",
        false,
    ),
    question(
        STACK,
        "What alternatives (tools, frameworks, or architectures) did you consider, and why didn’t you choose them?",
        false,
    ),
    question(
        QUALITY,
        "Does the core functionality work end-to-end as intended?",
        true,
    ),
    question(
        QUALITY,
        "What are the concrete outputs or results, and how do they tie back to the project’s goal?",
        true,
    ),
    question(
        MATURITY,
        "What trade-offs or limitations exist in this design, including security or safety concerns if relevant?",
        false,
    ),
    question(
        MATURITY,
        "If you had more time, what would you improve or work on next?",
        false,
    ),
];
