//! The interview dialogue controller.
//!
//! `Controller` owns the [`Session`] and is the only thing that mutates it.
//! It never performs I/O: every input arrives as an [`Event`] and every side
//! effect leaves as a [`Command`] for the runtime to execute. Completion of a
//! side effect comes back later as another event.

use crate::Command;
use crate::config::ControllerConfig;
use crate::error::InterviewError;
use crate::finalizer::FinalizeOutcome;
use crate::reviewer::Evaluation;
use crate::script::InterviewScript;
use crate::session::{ControllerState, Phase, Session, SessionSnapshot};
use crate::speech::CaptureEvent;
use crate::turn::Turn;

#[derive(Debug, Clone)]
pub enum Event {
    /// The user asked to begin. `capture_supported` reports whether speech
    /// capture exists in this environment at all.
    Start { capture_supported: bool },
    /// The user asked to end the interview.
    Stop,
    /// Synthesis of an utterance completed, failed or timed out.
    SpeechFinished { utterance: u64 },
    Capture { generation: u64, event: CaptureEvent },
    CaptureStartFailed { generation: u64, reason: String },
    /// The restart backoff elapsed.
    RestartCapture,
    Evaluated {
        round: u64,
        result: Result<Evaluation, InterviewError>,
    },
    /// `None` means advance. Generator failures arrive as `None` too.
    FollowUpDecided { round: u64, follow_up: Option<String> },
    EvaluationGraceElapsed { round: u64 },
    Tick,
    Finalized(Result<FinalizeOutcome, InterviewError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapturePhase {
    Off,
    Starting,
    Live,
}

#[derive(Debug, Clone)]
enum Decision {
    FollowUp(String),
    Advance,
}

/// One answer in the Main phase, from the final transcript until the next
/// interviewer turn.
#[derive(Debug)]
struct Round {
    id: u64,
    evaluation_pending: bool,
    decision: Option<Decision>,
    grace_scheduled: bool,
    grace_elapsed: bool,
}

pub struct Controller {
    config: ControllerConfig,
    script: InterviewScript,
    candidate_name: String,
    questions: Vec<String>,
    session: Session,
    state: ControllerState,
    capture: CapturePhase,
    capture_generation: u64,
    restart_pending: bool,
    utterance_seq: u64,
    speaking: Option<u64>,
    round_seq: u64,
    round: Option<Round>,
    follow_ups_asked: u32,
    feedback_round: u64,
    finalize_requested: bool,
    outcome: Option<Result<FinalizeOutcome, InterviewError>>,
    live_caption: Option<String>,
}

impl Controller {
    /// Blank questions are dropped so every interviewer turn has text.
    pub fn new(questions: Vec<String>, config: ControllerConfig) -> Self {
        let questions = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        Self {
            config,
            script: InterviewScript::default(),
            candidate_name: String::new(),
            questions,
            session: Session::new(),
            state: ControllerState::Idle,
            capture: CapturePhase::Off,
            capture_generation: 0,
            restart_pending: false,
            utterance_seq: 0,
            speaking: None,
            round_seq: 0,
            round: None,
            follow_ups_asked: 0,
            feedback_round: 0,
            finalize_requested: false,
            outcome: None,
            live_caption: None,
        }
    }

    pub fn with_candidate_name(mut self, name: impl Into<String>) -> Self {
        self.candidate_name = name.into();
        self
    }

    pub fn with_script(mut self, script: InterviewScript) -> Self {
        self.script = script;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// True once the finalizer has reported back.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&Result<FinalizeOutcome, InterviewError>> {
        self.outcome.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            active: self.session.active,
            phase: self.session.phase,
            question_index: self.session.question_index,
            question_count: self.questions.len(),
            transcript: self.session.transcript.turns().to_vec(),
            pending_feedback: self.session.pending_feedback.clone(),
            processing: self.session.processing,
            elapsed_seconds: self.session.elapsed_seconds,
            live_caption: self.live_caption.clone(),
        }
    }

    /// Single dispatch point for every input. Only `Event::Start` can fail.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Command>, InterviewError> {
        let mut commands = Vec::new();
        match event {
            Event::Start { capture_supported } => self.on_start(capture_supported, &mut commands)?,
            Event::Stop => self.on_stop(&mut commands),
            Event::SpeechFinished { utterance } => self.on_speech_finished(utterance, &mut commands),
            Event::Capture { generation, event } => {
                self.on_capture(generation, event, &mut commands)
            }
            Event::CaptureStartFailed { generation, reason } => {
                self.on_capture_start_failed(generation, reason, &mut commands)
            }
            Event::RestartCapture => self.on_restart_capture(&mut commands),
            Event::Evaluated { round, result } => self.on_evaluated(round, result, &mut commands),
            Event::FollowUpDecided { round, follow_up } => {
                self.on_follow_up(round, follow_up, &mut commands)
            }
            Event::EvaluationGraceElapsed { round } => self.on_grace_elapsed(round, &mut commands),
            Event::Tick => self.on_tick(),
            Event::Finalized(result) => self.on_finalized(result),
        }
        Ok(commands)
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            tracing::debug!("Controller {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.session.processing = state == ControllerState::Evaluating;
    }

    fn on_start(
        &mut self,
        capture_supported: bool,
        commands: &mut Vec<Command>,
    ) -> Result<(), InterviewError> {
        if self.state != ControllerState::Idle {
            tracing::warn!("Start requested while {:?}; ignoring.", self.state);
            return Ok(());
        }
        if !capture_supported {
            tracing::warn!("Refusing to start: speech capture is unavailable.");
            return Err(InterviewError::UnsupportedEnvironment);
        }
        tracing::info!(
            "Starting interview with {} main questions.",
            self.questions.len()
        );
        self.session.active = true;
        let welcome = self.script.welcome_for(&self.candidate_name);
        self.say(welcome, commands);
        Ok(())
    }

    /// Appends an interviewer turn and asks the runtime to speak it. Capture
    /// must already be off.
    fn say(&mut self, text: String, commands: &mut Vec<Command>) {
        self.session.append(Turn::interviewer(text.clone()));
        self.utterance_seq += 1;
        self.speaking = Some(self.utterance_seq);
        self.set_state(ControllerState::Speaking);
        commands.push(Command::Speak {
            utterance: self.utterance_seq,
            text,
        });
    }

    fn on_speech_finished(&mut self, utterance: u64, commands: &mut Vec<Command>) {
        if self.state != ControllerState::Speaking || self.speaking != Some(utterance) {
            tracing::debug!("Ignoring completion of stale utterance {}.", utterance);
            return;
        }
        self.speaking = None;
        self.set_state(ControllerState::Listening);
        self.start_capture(commands);
    }

    fn start_capture(&mut self, commands: &mut Vec<Command>) {
        if self.capture != CapturePhase::Off {
            return;
        }
        self.capture_generation += 1;
        self.capture = CapturePhase::Starting;
        commands.push(Command::StartCapture {
            generation: self.capture_generation,
        });
    }

    fn stop_capture(&mut self, commands: &mut Vec<Command>) {
        self.live_caption = None;
        self.restart_pending = false;
        if self.capture != CapturePhase::Off {
            self.capture = CapturePhase::Off;
            commands.push(Command::StopCapture);
        }
    }

    fn on_capture(&mut self, generation: u64, event: CaptureEvent, commands: &mut Vec<Command>) {
        if generation != self.capture_generation || !self.session.active {
            tracing::debug!("Dropping {:?} from capture generation {}.", event, generation);
            return;
        }
        if self.capture == CapturePhase::Off {
            // We stopped this capture ourselves; whatever it still reports is
            // either the expected end or a result that arrived too late.
            tracing::debug!("Ignoring {:?} from an intentionally stopped capture.", event);
            return;
        }

        match event {
            CaptureEvent::Started => {
                self.capture = CapturePhase::Live;
            }
            CaptureEvent::Ended => {
                self.capture = CapturePhase::Off;
                self.live_caption = None;
                self.capture_interrupted("capture ended unexpectedly".to_string(), false, commands);
            }
            CaptureEvent::Error(code) if code.is_fatal() => {
                tracing::warn!(
                    "Speech capture permission lost ({:?}); ending the interview.",
                    code
                );
                self.on_stop(commands);
            }
            CaptureEvent::Error(code) => {
                self.capture = CapturePhase::Off;
                self.live_caption = None;
                self.capture_interrupted(format!("capture error {:?}", code), true, commands);
            }
            CaptureEvent::Result(result) => {
                let text = result.transcript.trim();
                if text.is_empty() {
                    return;
                }
                if !result.is_final {
                    self.live_caption = Some(text.to_string());
                    return;
                }
                let text = text.to_string();
                self.on_answer(text, result.confidence, commands);
            }
        }
    }

    fn on_capture_start_failed(
        &mut self,
        generation: u64,
        reason: String,
        commands: &mut Vec<Command>,
    ) {
        if generation != self.capture_generation || self.capture == CapturePhase::Off {
            return;
        }
        self.capture = CapturePhase::Off;
        self.capture_interrupted(reason, true, commands);
    }

    /// Schedules a restart for a capture that went away without being asked
    /// to. At most one restart is pending at a time.
    fn capture_interrupted(&mut self, reason: String, after_error: bool, commands: &mut Vec<Command>) {
        let error = InterviewError::CaptureInterrupted { reason };
        if self.state != ControllerState::Listening || !self.session.active {
            tracing::debug!("{}; not listening, no restart.", error);
            return;
        }
        if self.restart_pending {
            tracing::debug!("{}; restart already scheduled.", error);
            return;
        }
        let after = if after_error {
            self.config.error_restart_backoff
        } else {
            self.config.restart_backoff
        };
        tracing::warn!("{}; restarting in {:?}.", error, after);
        self.restart_pending = true;
        commands.push(Command::ScheduleCaptureRestart { after });
    }

    fn on_restart_capture(&mut self, commands: &mut Vec<Command>) {
        self.restart_pending = false;
        if self.state == ControllerState::Listening && self.session.active {
            self.start_capture(commands);
        }
    }

    fn on_answer(&mut self, text: String, confidence: f32, commands: &mut Vec<Command>) {
        self.stop_capture(commands);
        let answer_index = self.session.transcript.len();
        self.session.append(Turn::candidate(text.clone(), Some(confidence)));
        tracing::info!("Candidate answered ({:?}): \"{}\"", self.session.phase, text);

        match self.session.phase {
            Phase::Intro => {
                self.session.advance_phase_to(Phase::Background);
                let prompt = self.script.background_prompt.clone();
                self.say(prompt, commands);
            }
            Phase::Background => {
                self.session.advance_phase_to(Phase::Main);
                self.session.question_index = 0;
                match self.questions.first().cloned() {
                    Some(question) => self.say(question, commands),
                    None => self.complete(commands),
                }
            }
            Phase::Main => self.begin_round(text, answer_index, commands),
            Phase::Complete => {}
        }
    }

    /// Fires evaluation and the follow-up request for the same answer at once.
    fn begin_round(&mut self, answer: String, answer_index: usize, commands: &mut Vec<Command>) {
        self.round_seq += 1;
        let id = self.round_seq;
        let question = self.questions[self.session.question_index].clone();
        self.set_state(ControllerState::Evaluating);

        commands.push(Command::Evaluate {
            round: id,
            question: question.clone(),
            answer: answer.clone(),
        });
        let decision = if self.follow_ups_asked < self.config.max_follow_ups {
            commands.push(Command::RequestFollowUp {
                round: id,
                question,
                answer,
                context: self.session.transcript.context_text(answer_index),
            });
            None
        } else {
            Some(Decision::Advance)
        };

        self.round = Some(Round {
            id,
            evaluation_pending: true,
            decision,
            grace_scheduled: false,
            grace_elapsed: false,
        });
        self.try_conclude_round(commands);
    }

    /// The follow-up decision gates the flow. A pending evaluation may hold it
    /// back for at most `evaluation_grace`.
    fn try_conclude_round(&mut self, commands: &mut Vec<Command>) {
        let grace = self.config.evaluation_grace;
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let Some(decision) = round.decision.clone() else {
            return;
        };
        if round.evaluation_pending && !round.grace_elapsed && !grace.is_zero() {
            if !round.grace_scheduled {
                round.grace_scheduled = true;
                commands.push(Command::ScheduleEvaluationGrace {
                    round: round.id,
                    after: grace,
                });
            }
            return;
        }
        self.round = None;
        self.apply_decision(decision, commands);
    }

    fn apply_decision(&mut self, decision: Decision, commands: &mut Vec<Command>) {
        match decision {
            Decision::FollowUp(question) => {
                self.follow_ups_asked += 1;
                tracing::info!("Asking follow-up: \"{}\"", question);
                self.say(question, commands);
            }
            Decision::Advance => {
                self.follow_ups_asked = 0;
                let next = self.session.question_index + 1;
                if next < self.questions.len() {
                    self.session.question_index = next;
                    let question = self.questions[next].clone();
                    self.say(question, commands);
                } else {
                    tracing::info!("All questions answered.");
                    self.complete(commands);
                }
            }
        }
    }

    fn on_evaluated(
        &mut self,
        round: u64,
        result: Result<Evaluation, InterviewError>,
        commands: &mut Vec<Command>,
    ) {
        if !self.session.active {
            tracing::debug!("Discarding evaluation for round {} after the interview ended.", round);
            return;
        }
        match result {
            Ok(evaluation) if round >= self.feedback_round => {
                tracing::debug!("Round {} scored {}.", round, evaluation.score);
                self.feedback_round = round;
                self.session.pending_feedback = Some(evaluation);
            }
            Ok(_) => {
                tracing::debug!("Discarding evaluation for superseded round {}.", round);
            }
            Err(e) => {
                tracing::warn!("{}; continuing without feedback.", e);
            }
        }

        if let Some(current) = self.round.as_mut() {
            if current.id == round {
                current.evaluation_pending = false;
                self.try_conclude_round(commands);
            }
        }
    }

    fn on_follow_up(&mut self, round: u64, follow_up: Option<String>, commands: &mut Vec<Command>) {
        let Some(current) = self.round.as_mut() else {
            tracing::debug!("Discarding follow-up decision for round {}.", round);
            return;
        };
        if current.id != round || current.decision.is_some() {
            tracing::debug!("Discarding follow-up decision for round {}.", round);
            return;
        }
        let follow_up = follow_up
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        current.decision = Some(match follow_up {
            Some(question) => Decision::FollowUp(question),
            None => Decision::Advance,
        });
        self.try_conclude_round(commands);
    }

    fn on_grace_elapsed(&mut self, round: u64, commands: &mut Vec<Command>) {
        if let Some(current) = self.round.as_mut() {
            if current.id == round {
                tracing::debug!("Evaluation for round {} still pending; moving on.", round);
                current.grace_elapsed = true;
                self.try_conclude_round(commands);
            }
        }
    }

    fn on_tick(&mut self) {
        if self.session.active {
            self.session.elapsed_seconds += 1;
        }
    }

    fn on_stop(&mut self, commands: &mut Vec<Command>) {
        if matches!(self.state, ControllerState::Idle | ControllerState::Complete) {
            tracing::debug!("Stop requested while {:?}; nothing to do.", self.state);
            return;
        }
        tracing::info!("Ending interview on request.");
        self.stop_capture(commands);
        if self.speaking.take().is_some() {
            commands.push(Command::CancelSpeech);
        }
        self.round = None;
        self.complete(commands);
    }

    fn complete(&mut self, commands: &mut Vec<Command>) {
        self.stop_capture(commands);
        self.set_state(ControllerState::Complete);
        self.session.advance_phase_to(Phase::Complete);
        self.session.active = false;
        self.round = None;
        if !self.finalize_requested {
            self.finalize_requested = true;
            commands.push(Command::Finalize {
                transcript: self.session.transcript.turns().to_vec(),
            });
        }
    }

    fn on_finalized(&mut self, result: Result<FinalizeOutcome, InterviewError>) {
        if self.outcome.is_some() {
            return;
        }
        let result = match result {
            Ok(outcome) if !outcome.success => Err(InterviewError::finalization(
                "finalizer reported an unsuccessful save",
            )),
            other => other,
        };
        match &result {
            Ok(outcome) => tracing::info!("Interview finalized: {}", outcome.location),
            Err(e) => tracing::error!("{}", e),
        }
        self.outcome = Some(result);
    }
}
