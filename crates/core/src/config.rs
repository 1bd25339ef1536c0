//! Tunables for the dialogue controller and its runtime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters handed to the speech synthesizer with every utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub rate: f32,
    pub pitch: f32,
    /// 0.0 ..= 1.0
    pub volume: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Utterances finish immediately without reaching the synthesizer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
            muted: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before restarting a capture session that ended on its own.
    pub restart_backoff: Duration,
    /// Delay before restarting after the capture reported an error.
    pub error_restart_backoff: Duration,
    /// How long a resolved follow-up decision waits for a pending evaluation.
    pub evaluation_grace: Duration,
    /// Upper bound for a single utterance; expiry counts as speech finished.
    pub speech_timeout: Duration,
    pub tick_period: Duration,
    /// Follow-ups allowed per main question before the interview must advance.
    pub max_follow_ups: u32,
    pub voice: VoiceSettings,
}

impl VoiceSettings {
    /// Sets the volume from a 0..=100 percentage.
    pub fn with_volume_percent(mut self, percent: u8) -> Self {
        self.volume = f32::from(percent.min(100)) / 100.0;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            restart_backoff: Duration::from_millis(300),
            error_restart_backoff: Duration::from_millis(500),
            evaluation_grace: Duration::from_millis(1500),
            speech_timeout: Duration::from_secs(10),
            tick_period: Duration::from_secs(1),
            max_follow_ups: 1,
            voice: VoiceSettings::default(),
        }
    }
}
