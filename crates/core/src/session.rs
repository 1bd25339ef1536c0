use crate::reviewer::Evaluation;
use crate::turn::{Transcript, Turn};
use serde::Serialize;

/// Coarse stage of the interview. Ordered, and only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Intro,
    Background,
    Main,
    Complete,
}

/// What the controller is doing right now.
///
/// Listening, Speaking and Evaluating are mutually exclusive by construction:
/// the interviewer never captures speech while it talks or while an answer is
/// being scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Listening,
    Evaluating,
    Speaking,
    Complete,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub active: bool,
    pub phase: Phase,
    pub question_index: usize,
    pub transcript: Transcript,
    pub pending_feedback: Option<Evaluation>,
    pub processing: bool,
    pub elapsed_seconds: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            active: false,
            phase: Phase::Intro,
            question_index: 0,
            transcript: Transcript::new(),
            pending_feedback: None,
            processing: false,
            elapsed_seconds: 0,
        }
    }

    /// Moves to `phase` if it is ahead of the current one. Never regresses.
    pub fn advance_phase_to(&mut self, phase: Phase) {
        if phase > self.phase {
            tracing::debug!("Phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the session handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: ControllerState,
    pub active: bool,
    pub phase: Phase,
    pub question_index: usize,
    pub question_count: usize,
    pub transcript: Vec<Turn>,
    pub pending_feedback: Option<Evaluation>,
    pub processing: bool,
    pub elapsed_seconds: u64,
    pub live_caption: Option<String>,
}

impl SessionSnapshot {
    pub fn idle(question_count: usize) -> Self {
        Self {
            state: ControllerState::Idle,
            active: false,
            phase: Phase::Intro,
            question_index: 0,
            question_count,
            transcript: vec![],
            pending_feedback: None,
            processing: false,
            elapsed_seconds: 0,
            live_caption: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state == ControllerState::Listening
    }

    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
