//! JSON messages exchanged over `/ws`, tagged by `type`.
//!
//! Client -> Server:
//! ```json
//! {"type": "start", "candidate_name": "Ada", "questions": ["..."], "speech_supported": true}
//! {"type": "transcript", "is_final": true, "transcript": "...", "confidence": 0.92}
//! {"type": "capture_error", "code": "no-speech"}
//! {"type": "speech_finished"}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"type": "speak", "text": "...", "voice": {"rate": 1.0, "pitch": 1.0, "volume": 1.0}}
//! {"type": "start_listening"}
//! {"type": "snapshot", "state": "listening", "phase": "main", ...}
//! {"type": "ended", "location": "feedback/interview-....json"}
//! ```

use interview_core::config::VoiceSettings;
use interview_core::session::SessionSnapshot;
use interview_core::speech::CaptureErrorCode;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start {
        #[serde(default)]
        candidate_name: String,
        /// Falls back to the server's default questions when empty.
        #[serde(default)]
        questions: Vec<String>,
        #[serde(default = "default_true")]
        speech_supported: bool,
    },
    CaptureStarted,
    CaptureEnded,
    CaptureError {
        code: CaptureErrorCode,
    },
    Transcript {
        is_final: bool,
        transcript: String,
        #[serde(default)]
        confidence: f32,
    },
    SpeechFinished,
    Stop,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Speak {
        text: String,
        voice: VoiceSettings,
    },
    CancelSpeech,
    StartListening,
    StopListening,
    Snapshot(SessionSnapshot),
    Ended {
        location: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback_location: Option<String>,
    },
}
