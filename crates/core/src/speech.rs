use crate::config::VoiceSettings;
use crate::controller::Event;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// One recognized segment, as reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub is_final: bool,
    pub transcript: String,
    /// 0.0 ..= 1.0
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CaptureErrorCode {
    NotAllowed,
    ServiceNotAllowed,
    NoSpeech,
    AudioCapture,
    Network,
    Aborted,
    Other(String),
}

impl CaptureErrorCode {
    /// Permission was refused or revoked; restarting cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureErrorCode::NotAllowed | CaptureErrorCode::ServiceNotAllowed
        )
    }
}

impl From<String> for CaptureErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "not-allowed" => CaptureErrorCode::NotAllowed,
            "service-not-allowed" => CaptureErrorCode::ServiceNotAllowed,
            "no-speech" => CaptureErrorCode::NoSpeech,
            "audio-capture" => CaptureErrorCode::AudioCapture,
            "network" => CaptureErrorCode::Network,
            "aborted" => CaptureErrorCode::Aborted,
            _ => CaptureErrorCode::Other(code),
        }
    }
}

impl From<CaptureErrorCode> for String {
    fn from(code: CaptureErrorCode) -> Self {
        match code {
            CaptureErrorCode::NotAllowed => "not-allowed".to_string(),
            CaptureErrorCode::ServiceNotAllowed => "service-not-allowed".to_string(),
            CaptureErrorCode::NoSpeech => "no-speech".to_string(),
            CaptureErrorCode::AudioCapture => "audio-capture".to_string(),
            CaptureErrorCode::Network => "network".to_string(),
            CaptureErrorCode::Aborted => "aborted".to_string(),
            CaptureErrorCode::Other(code) => code,
        }
    }
}

/// Lifecycle and result events emitted by a speech capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started,
    Ended,
    Error(CaptureErrorCode),
    Result(RecognitionResult),
}

/// Where a capture session reports its events.
///
/// Every sink is bound to the capture generation it was handed out for, so
/// events from a session the controller already stopped arrive tagged with an
/// old generation and are dropped.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    generation: u64,
    events: UnboundedSender<Event>,
}

impl CaptureSink {
    pub fn new(generation: u64, events: UnboundedSender<Event>) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the interview runtime has shut down.
    pub fn send(&self, event: CaptureEvent) -> bool {
        self.events
            .send(Event::Capture {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.send(CaptureEvent::Started)
    }

    pub fn ended(&self) -> bool {
        self.send(CaptureEvent::Ended)
    }

    pub fn error(&self, code: CaptureErrorCode) -> bool {
        self.send(CaptureEvent::Error(code))
    }

    pub fn result(&self, transcript: impl Into<String>, confidence: f32, is_final: bool) -> bool {
        self.send(CaptureEvent::Result(RecognitionResult {
            is_final,
            transcript: transcript.into(),
            confidence,
        }))
    }
}

/// Speech-to-text capability. It may end on its own at any time and must be
/// restartable.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Begins a capture session reporting into `sink`. Resolves once the
    /// microphone has been acquired.
    async fn start(&self, sink: CaptureSink) -> Result<()>;

    fn stop(&self);
}

/// Text-to-speech capability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Resolves when the utterance has finished playing.
    async fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()>;

    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_their_wire_names() {
        let code: CaptureErrorCode = serde_json::from_str("\"not-allowed\"").unwrap();
        assert_eq!(code, CaptureErrorCode::NotAllowed);
        assert!(code.is_fatal());

        let code: CaptureErrorCode = serde_json::from_str("\"bad-grammar\"").unwrap();
        assert_eq!(code, CaptureErrorCode::Other("bad-grammar".to_string()));
        assert!(!code.is_fatal());
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"bad-grammar\"");
    }

    #[test]
    fn sink_tags_events_with_its_generation() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = CaptureSink::new(7, tx);
        assert_eq!(sink.generation(), 7);
        assert!(sink.result("hello", 0.5, true));

        match rx.try_recv().unwrap() {
            Event::Capture { generation, event } => {
                assert_eq!(generation, 7);
                assert!(matches!(event, CaptureEvent::Result(r) if r.is_final && r.transcript == "hello"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop(rx);
        assert!(!sink.ended());
    }
}
