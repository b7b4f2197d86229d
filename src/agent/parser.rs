//! Parses one ReAct completion into either a tool action or a final answer.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

const FINAL_ANSWER: &str = "Final Answer:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("valid action regex")
});

static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("valid action regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Action {
        tool: String,
        input: String,
        log: String,
    },
    Finish {
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Invalid Format: Missing 'Action:' after 'Thought:'")]
    MissingAction,

    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,

    #[error("Invalid Format: Reply contains both an action and a final answer, use only one")]
    ActionAndFinalAnswer,
}

/// Drops any observation the model wrote itself after its action input.
fn strip_hallucinated_observation(text: &str) -> &str {
    if let Some(input_at) = text.find("Action Input:")
        && let Some(obs_at) = text[input_at..].find("\nObservation:")
    {
        return &text[..input_at + obs_at];
    }
    text
}

pub fn parse_step(raw: &str) -> Result<Step, ParseError> {
    let text = strip_hallucinated_observation(raw);
    let final_at = text.find(FINAL_ANSWER);

    if let Some(caps) = ACTION_RE.captures(text) {
        if final_at.is_some() {
            return Err(ParseError::ActionAndFinalAnswer);
        }

        let tool = caps
            .get(1)
            .map(|m| m.as_str().trim().trim_matches('`'))
            .unwrap_or_default()
            .to_string();
        let input = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();

        return Ok(Step::Action {
            tool,
            input,
            log: text.trim_end().to_string(),
        });
    }

    if let Some(at) = final_at {
        return Ok(Step::Finish {
            output: text[at + FINAL_ANSWER.len()..].trim().to_string(),
        });
    }

    if !ACTION_ONLY_RE.is_match(text) {
        Err(ParseError::MissingAction)
    } else {
        Err(ParseError::MissingActionInput)
    }
}
