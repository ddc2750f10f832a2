//! Sorting incoming chat text before any upstream call is made.

/// Phrases that request a chart for the session's last result.
const CHART_TRIGGERS: [&str; 3] = ["show chart", "chart", "/chart"];

/// Markers that identify prompts the chat host generates on its own (titles,
/// follow-up suggestions, tags). Matched against the lower-cased text.
const SYNTHETIC_MARKERS: [&str; 10] = [
    "chat_history",
    "<chat_history>",
    "### task:",
    "output: json",
    "your entire response must consist solely of a json object",
    "follow-up",
    "follow ups",
    "\"follow_ups\"",
    "suggest 3-5 relevant follow-up questions",
    "generate a concise, 3-5 word title",
];

/// Markers that only identify a synthetic prompt when all appear together.
const SYNTHETIC_MARKER_SETS: [&[&str]; 3] = [
    &["emoji summarizing the chat history", "title"],
    &["\"title\":", "examples:", "chat history"],
    &["/stream/ask", "chat history"],
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    /// Host-generated prompt; answered with nothing.
    Synthetic,
    ChartCommand,
    /// A genuine question, trimmed.
    Question(String),
}

pub fn classify(text: &str) -> Input {
    let text = text.trim();
    if text.is_empty() {
        Input::Empty
    } else if is_synthetic_prompt(text) {
        Input::Synthetic
    } else if is_chart_command(text) {
        Input::ChartCommand
    } else {
        Input::Question(text.to_string())
    }
}

pub fn is_chart_command(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    CHART_TRIGGERS.contains(&lowered.as_str())
}

pub fn is_synthetic_prompt(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SYNTHETIC_MARKERS.iter().any(|m| lowered.contains(m))
        || SYNTHETIC_MARKER_SETS
            .iter()
            .any(|set| set.iter().all(|m| lowered.contains(m)))
}
