pub mod config;
pub mod controller;
pub mod error;
pub mod finalizer;
pub mod offline_reviewer;
pub mod reviewer;
pub mod runtime;
pub mod script;
pub mod session;
pub mod speech;
pub mod turn;

use crate::turn::Turn;
use std::time::Duration;

pub use controller::{Controller, Event};
pub use error::InterviewError;
pub use runtime::{Capabilities, InterviewRuntime, InterviewSummary, RuntimeHandle};

/// Represents commands that the dialogue logic (`Controller`) issues to the runtime.
///
/// This enum is the primary API for decoupling the controller's decisions
/// from the runtime's execution of side effects. Every long-running command
/// reports back with the matching [`Event`], tagged with the id it was issued
/// with so stale completions can be told apart.
#[derive(Debug, Clone)]
pub enum Command {
    /// Speak the text. Completion is reported as `Event::SpeechFinished`.
    Speak { utterance: u64, text: String },
    /// Interrupt whatever is being spoken.
    CancelSpeech,
    /// Open a capture session bound to `generation`.
    StartCapture { generation: u64 },
    /// Close the current capture session on purpose.
    StopCapture,
    /// Post `Event::RestartCapture` after the delay.
    ScheduleCaptureRestart { after: Duration },
    Evaluate {
        round: u64,
        question: String,
        answer: String,
    },
    RequestFollowUp {
        round: u64,
        question: String,
        answer: String,
        /// Transcript lines before the answer, oldest first.
        context: String,
    },
    /// Post `Event::EvaluationGraceElapsed` after the delay.
    ScheduleEvaluationGrace { round: u64, after: Duration },
    /// Persist the transcript. Issued at most once per interview.
    Finalize { transcript: Vec<Turn> },
}
