//! Speech capabilities backed by a terminal: typed lines stand in for the
//! microphone and printed lines for the speaker.

use anyhow::Result;
use async_trait::async_trait;
use interview_core::config::VoiceSettings;
use interview_core::speech::{CaptureSink, SpeechCapture, SpeechSynthesizer};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{Notify, oneshot};

type SharedSink = Arc<Mutex<Option<CaptureSink>>>;

fn lock(sink: &SharedSink) -> MutexGuard<'_, Option<CaptureSink>> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn deliver(sink: &SharedSink, line: &str) {
    match lock(sink).as_ref() {
        Some(sink) => {
            sink.result(line, 1.0, true);
        }
        None => tracing::debug!("Not listening; dropped input \"{}\"", line),
    }
}

/// Treats each non-empty input line as a final transcript.
///
/// Lines typed while no capture session is open (the interviewer is talking
/// or the answer is being reviewed) are discarded, like speech nobody was
/// listening to.
pub struct TerminalCapture {
    current: SharedSink,
}

impl TerminalCapture {
    /// Starts reading `input` in the background. The returned receiver fires
    /// when the input reaches EOF.
    pub fn spawn<R>(input: R) -> (Self, oneshot::Receiver<()>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let current = SharedSink::default();
        let (eof_tx, eof_rx) = oneshot::channel();

        let reader_sink = current.clone();
        tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        deliver(&reader_sink, line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            let _ = eof_tx.send(());
        });

        (Self { current }, eof_rx)
    }
}

#[async_trait]
impl SpeechCapture for TerminalCapture {
    fn is_supported(&self) -> bool {
        true
    }

    async fn start(&self, sink: CaptureSink) -> Result<()> {
        sink.started();
        *lock(&self.current) = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        if let Some(sink) = lock(&self.current).take() {
            sink.ended();
        }
    }
}

/// Prints interviewer turns and holds each one for a reading pause
/// proportional to its length.
pub struct TerminalVoice {
    per_word: Duration,
    cancelled: Notify,
}

impl Default for TerminalVoice {
    fn default() -> Self {
        Self::new(Duration::from_millis(120))
    }
}

impl TerminalVoice {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            cancelled: Notify::new(),
        }
    }

    /// Time an utterance holds the floor. Muted voices do not pause.
    pub fn pause_for(&self, text: &str, voice: &VoiceSettings) -> Duration {
        if voice.muted {
            return Duration::ZERO;
        }
        let words = text.split_whitespace().count() as f64;
        let rate = if voice.rate > 0.0 { voice.rate as f64 } else { 1.0 };
        let millis = self.per_word.as_millis() as f64 * words / rate;
        Duration::from_millis(millis.round() as u64)
    }
}

#[async_trait]
impl SpeechSynthesizer for TerminalVoice {
    async fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()> {
        let pause = self.pause_for(text, voice);
        let cancelled = self.cancelled.notified();

        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "\nInterviewer: {text}")?;
            out.flush()?;
        }

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancelled => tracing::debug!("Utterance cancelled."),
        }

        let mut out = std::io::stdout().lock();
        write!(out, "> ")?;
        out.flush()?;
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}
