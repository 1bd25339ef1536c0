use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Candidate,
    Interviewer,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Candidate => "candidate",
            Speaker::Interviewer => "interviewer",
        }
    }
}

/// One recorded utterance of the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Recognition confidence on a 0..=100 scale, only present on candidate turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl Turn {
    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Interviewer,
            text: text.into(),
            timestamp: Utc::now(),
            confidence: None,
        }
    }

    /// Builds a candidate turn from a recognizer confidence in the 0..1 range.
    pub fn candidate(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            text: text.into(),
            timestamp: Utc::now(),
            confidence: confidence.map(confidence_percent),
        }
    }
}

fn confidence_percent(raw: f32) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    (raw.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn count(&self, speaker: Speaker) -> usize {
        self.turns.iter().filter(|t| t.speaker == speaker).count()
    }

    /// Renders the first `upto` turns as `speaker: text` lines for prompt context.
    pub fn context_text(&self, upto: usize) -> String {
        self.turns
            .iter()
            .take(upto)
            .map(|t| format!("{}: {}", t.speaker.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
