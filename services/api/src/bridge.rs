//! Speech capabilities implemented by the connected browser.
//!
//! The browser owns the microphone and the speaker. The bridge forwards the
//! runtime's requests as [`ServerMessage`]s and feeds the browser's reports
//! back into the current capture session or the utterance being spoken.

use crate::protocol::{ClientMessage, ServerMessage};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use interview_core::config::VoiceSettings;
use interview_core::speech::{CaptureSink, SpeechCapture, SpeechSynthesizer};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct BrowserBridge {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    speech_supported: bool,
    sink: Mutex<Option<CaptureSink>>,
    speaking: Mutex<Option<oneshot::Sender<()>>>,
}

impl BrowserBridge {
    pub fn new(outbound: mpsc::UnboundedSender<ServerMessage>, speech_supported: bool) -> Self {
        Self {
            outbound,
            speech_supported,
            sink: Mutex::new(None),
            speaking: Mutex::new(None),
        }
    }

    fn send(&self, message: ServerMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| anyhow!("browser disconnected"))
    }

    /// Routes a capture or speech report from the browser. Reports arriving
    /// while no capture session is open are dropped.
    pub fn on_client(&self, message: ClientMessage) {
        match message {
            ClientMessage::SpeechFinished => {
                if let Some(done) = lock(&self.speaking).take() {
                    let _ = done.send(());
                }
            }
            ClientMessage::CaptureStarted => self.with_sink(|sink| sink.started()),
            ClientMessage::CaptureEnded => self.with_sink(|sink| sink.ended()),
            ClientMessage::CaptureError { code } => self.with_sink(|sink| sink.error(code)),
            ClientMessage::Transcript {
                is_final,
                transcript,
                confidence,
            } => self.with_sink(|sink| sink.result(transcript, confidence, is_final)),
            ClientMessage::Start { .. } | ClientMessage::Stop => {
                tracing::debug!("{:?} is handled by the connection, not the bridge", message);
            }
        }
    }

    fn with_sink(&self, f: impl FnOnce(&CaptureSink) -> bool) {
        match lock(&self.sink).as_ref() {
            Some(sink) => {
                f(sink);
            }
            None => tracing::debug!("No capture session open; dropping browser report."),
        }
    }
}

#[async_trait]
impl SpeechCapture for BrowserBridge {
    fn is_supported(&self) -> bool {
        self.speech_supported
    }

    async fn start(&self, sink: CaptureSink) -> Result<()> {
        *lock(&self.sink) = Some(sink);
        self.send(ServerMessage::StartListening)
    }

    fn stop(&self) {
        if lock(&self.sink).take().is_some() {
            let _ = self.send(ServerMessage::StopListening);
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for BrowserBridge {
    async fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()> {
        if voice.muted {
            return Ok(());
        }
        let (done, finished) = oneshot::channel();
        *lock(&self.speaking) = Some(done);
        self.send(ServerMessage::Speak {
            text: text.to_string(),
            voice: voice.clone(),
        })?;
        finished
            .await
            .map_err(|_| anyhow!("utterance cancelled"))
    }

    fn cancel(&self) {
        // Dropping the sender resolves the pending `speak`.
        lock(&self.speaking).take();
        let _ = self.send(ServerMessage::CancelSpeech);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::controller::Event;
    use interview_core::speech::{CaptureErrorCode, CaptureEvent};
    use std::sync::Arc;

    fn bridge() -> (Arc<BrowserBridge>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(BrowserBridge::new(tx, true)), rx)
    }

    #[tokio::test]
    async fn browser_reports_reach_the_open_capture_only() {
        let (bridge, mut outbound) = bridge();
        let (events_tx, mut events) = mpsc::unbounded_channel();

        bridge.start(CaptureSink::new(3, events_tx)).await.unwrap();
        assert!(matches!(outbound.recv().await, Some(ServerMessage::StartListening)));

        bridge.on_client(ClientMessage::CaptureStarted);
        bridge.on_client(ClientMessage::Transcript {
            is_final: true,
            transcript: "I'm Ada".into(),
            confidence: 0.8,
        });
        bridge.on_client(ClientMessage::CaptureError {
            code: CaptureErrorCode::NoSpeech,
        });

        let mut received = Vec::new();
        while let Ok(Event::Capture { generation, event }) = events.try_recv() {
            assert_eq!(generation, 3);
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], CaptureEvent::Started);
        assert!(matches!(&received[1], CaptureEvent::Result(r) if r.transcript == "I'm Ada"));

        bridge.stop();
        assert!(matches!(outbound.recv().await, Some(ServerMessage::StopListening)));
        bridge.on_client(ClientMessage::CaptureEnded);
        assert!(events.try_recv().is_err());

        // A second stop has nothing to release.
        bridge.stop();
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn speak_resolves_when_browser_finishes() {
        let (bridge, mut outbound) = bridge();
        let speaking = bridge.clone();
        let task = tokio::spawn(async move {
            speaking
                .speak("Hello Ada!", &VoiceSettings::default())
                .await
        });

        match outbound.recv().await {
            Some(ServerMessage::Speak { text, .. }) => assert_eq!(text, "Hello Ada!"),
            other => panic!("unexpected message {other:?}"),
        }
        bridge.on_client(ClientMessage::SpeechFinished);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn muted_speech_never_reaches_the_browser() {
        let (bridge, mut outbound) = bridge();
        let muted = VoiceSettings {
            muted: true,
            ..VoiceSettings::default()
        };
        bridge.speak("Hello Ada!", &muted).await.unwrap();
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_resolves_pending_speech() {
        let (bridge, mut outbound) = bridge();
        let speaking = bridge.clone();
        let task = tokio::spawn(async move {
            speaking
                .speak("A long question", &VoiceSettings::default())
                .await
        });

        assert!(matches!(outbound.recv().await, Some(ServerMessage::Speak { .. })));
        bridge.cancel();
        assert!(task.await.unwrap().is_err());
        assert!(matches!(outbound.recv().await, Some(ServerMessage::CancelSpeech)));
    }

    #[tokio::test]
    async fn disconnected_browser_fails_capture_start() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let bridge = BrowserBridge::new(tx, true);
        let (events_tx, _events) = mpsc::unbounded_channel();
        assert!(bridge.start(CaptureSink::new(1, events_tx)).await.is_err());
    }
}
