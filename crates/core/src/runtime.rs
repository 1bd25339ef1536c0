//! Async shell around the [`Controller`].
//!
//! The runtime owns the event queue. It feeds events to the controller one at
//! a time, publishes a snapshot after each, and turns the returned commands
//! into spawned tasks whose completions come back through the same queue.

use crate::Command;
use crate::controller::{Controller, Event};
use crate::error::InterviewError;
use crate::finalizer::Finalizer;
use crate::reviewer::{Evaluation, Evaluator, FollowUpGenerator};
use crate::session::SessionSnapshot;
use crate::speech::{CaptureSink, SpeechCapture, SpeechSynthesizer};
use crate::turn::Turn;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

/// The external services an interview talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub capture: Arc<dyn SpeechCapture>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub evaluator: Arc<dyn Evaluator>,
    pub follow_up: Arc<dyn FollowUpGenerator>,
    pub finalizer: Arc<dyn Finalizer>,
}

/// What a finished interview leaves behind.
#[derive(Debug, Clone)]
pub struct InterviewSummary {
    pub transcript: Vec<Turn>,
    pub pending_feedback: Option<Evaluation>,
    pub elapsed_seconds: u64,
    /// Where the finalizer stored the session.
    pub location: String,
}

/// Cloneable remote control for a running interview.
#[derive(Clone)]
pub struct RuntimeHandle {
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl RuntimeHandle {
    /// Ends the interview. Returns `false` if the runtime has already exited.
    pub fn stop(&self) -> bool {
        self.events.send(Event::Stop).is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }
}

/// Stops the capture on release or drop, so the microphone is never left
/// open on any exit path.
///
/// `live` holds the generation the runtime currently wants open, or 0. A
/// start that resolves after the guard was released stops the capture itself,
/// since the guard's own `stop` ran before there was anything to stop.
struct CaptureGuard {
    capture: Arc<dyn SpeechCapture>,
    live: Arc<AtomicU64>,
}

impl CaptureGuard {
    fn new(capture: Arc<dyn SpeechCapture>) -> Self {
        Self {
            capture,
            live: Arc::new(AtomicU64::new(0)),
        }
    }

    fn arm(&self, generation: u64) -> Arc<AtomicU64> {
        self.live.store(generation, Ordering::SeqCst);
        self.live.clone()
    }

    fn release(&self) {
        if self.live.swap(0, Ordering::SeqCst) != 0 {
            self.capture.stop();
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct InterviewRuntime {
    controller: Controller,
    caps: Capabilities,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshots: watch::Sender<SessionSnapshot>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    guard: CaptureGuard,
    tasks: JoinSet<()>,
}

impl InterviewRuntime {
    pub fn new(controller: Controller, caps: Capabilities) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(controller.snapshot());
        let guard = CaptureGuard::new(caps.capture.clone());
        Self {
            controller,
            caps,
            events_tx,
            events_rx,
            snapshots,
            snapshot_rx,
            guard,
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            events: self.events_tx.clone(),
            snapshots: self.snapshot_rx.clone(),
        }
    }

    /// Runs the interview to completion.
    ///
    /// Returns once the finalizer has reported back, either through the
    /// normal end of the question list or after [`RuntimeHandle::stop`].
    pub async fn run(mut self) -> Result<InterviewSummary, InterviewError> {
        let capture_supported = self.caps.capture.is_supported();
        let commands = self.controller.handle(Event::Start { capture_supported })?;
        self.publish();
        self.execute_all(commands);

        let period = self.controller.config().tick_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.controller.is_finished() {
            let event = tokio::select! {
                Some(event) = self.events_rx.recv() => event,
                _ = ticker.tick() => Event::Tick,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!("Interview task panicked: {}", e);
                        }
                    }
                    continue;
                }
            };

            match self.controller.handle(event) {
                Ok(commands) => {
                    self.publish();
                    self.execute_all(commands);
                }
                Err(e) => tracing::warn!("Controller rejected event: {}", e),
            }
        }

        self.guard.release();
        // In-flight reviews and capture starts run to completion; their
        // events are never read.
        self.tasks.detach_all();

        let snapshot = self.controller.snapshot();
        match self.controller.outcome().cloned() {
            Some(Ok(outcome)) => Ok(InterviewSummary {
                transcript: snapshot.transcript,
                pending_feedback: snapshot.pending_feedback,
                elapsed_seconds: snapshot.elapsed_seconds,
                location: outcome.location,
            }),
            Some(Err(e)) => Err(e),
            None => Err(InterviewError::finalization("interview ended before it was saved")),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }

    fn execute_all(&mut self, commands: Vec<Command>) {
        for command in commands {
            tracing::trace!("Executing {:?}", command);
            self.execute(command);
        }
    }

    fn post_after(&mut self, after: Duration, event: Event) {
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(event);
        });
    }

    fn execute(&mut self, command: Command) {
        let events = self.events_tx.clone();
        match command {
            Command::Speak { utterance, text } => {
                let synthesizer = self.caps.synthesizer.clone();
                let voice = self.controller.config().voice.clone();
                let timeout = self.controller.config().speech_timeout;
                self.tasks.spawn(async move {
                    match tokio::time::timeout(timeout, synthesizer.speak(&text, &voice)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!("Speech synthesis failed: {:#}", e),
                        Err(_) => {
                            tracing::warn!("Speech synthesis timed out after {:?}", timeout);
                            synthesizer.cancel();
                        }
                    }
                    let _ = events.send(Event::SpeechFinished { utterance });
                });
            }
            Command::CancelSpeech => self.caps.synthesizer.cancel(),
            Command::StartCapture { generation } => {
                let live = self.guard.arm(generation);
                let capture = self.caps.capture.clone();
                let sink = CaptureSink::new(generation, events.clone());
                self.tasks.spawn(async move {
                    match capture.start(sink).await {
                        Ok(()) if live.load(Ordering::SeqCst) == 0 => {
                            tracing::debug!(
                                "Capture generation {} opened after release; stopping.",
                                generation
                            );
                            capture.stop();
                        }
                        Ok(()) => {}
                        Err(e) => {
                            let _ = events.send(Event::CaptureStartFailed {
                                generation,
                                reason: format!("{e:#}"),
                            });
                        }
                    }
                });
            }
            Command::StopCapture => self.guard.release(),
            Command::ScheduleCaptureRestart { after } => {
                self.post_after(after, Event::RestartCapture)
            }
            Command::ScheduleEvaluationGrace { round, after } => {
                self.post_after(after, Event::EvaluationGraceElapsed { round })
            }
            Command::Evaluate {
                round,
                question,
                answer,
            } => {
                let evaluator = self.caps.evaluator.clone();
                self.tasks.spawn(async move {
                    let result = match evaluator.evaluate(&question, &answer).await {
                        Ok(evaluation) if evaluation.score <= 100 => Ok(evaluation),
                        Ok(evaluation) => Err(InterviewError::EvaluationFailed {
                            reason: format!("score {} is outside 0..=100", evaluation.score),
                        }),
                        Err(e) => Err(InterviewError::EvaluationFailed {
                            reason: format!("{e:#}"),
                        }),
                    };
                    let _ = events.send(Event::Evaluated { round, result });
                });
            }
            Command::RequestFollowUp {
                round,
                question,
                answer,
                context,
            } => {
                let generator = self.caps.follow_up.clone();
                self.tasks.spawn(async move {
                    let follow_up = match generator.follow_up(&question, &answer, &context).await {
                        Ok(follow_up) => follow_up,
                        Err(e) => {
                            let error = InterviewError::FollowUpFailed {
                                reason: format!("{e:#}"),
                            };
                            tracing::warn!("{}; advancing.", error);
                            None
                        }
                    };
                    let _ = events.send(Event::FollowUpDecided { round, follow_up });
                });
            }
            Command::Finalize { transcript } => {
                let finalizer = self.caps.finalizer.clone();
                self.tasks.spawn(async move {
                    let result = finalizer
                        .finalize(&transcript)
                        .await
                        .map_err(|e| InterviewError::finalization(format!("{e:#}")));
                    let _ = events.send(Event::Finalized(result));
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, VoiceSettings};
    use crate::finalizer::{FinalizeOutcome, MockFinalizer};
    use crate::reviewer::{MockEvaluator, MockFollowUpGenerator};
    use crate::script::InterviewScript;
    use crate::session::{ControllerState, Phase};
    use crate::speech::MockSpeechSynthesizer;
    use crate::turn::Speaker;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    enum Step {
        /// Interim result followed by the same final result, twice.
        Answer(&'static str),
        /// The session ends by itself before anything is heard.
        Drop,
    }

    /// Plays one step per capture session. With no steps left it stays silent.
    struct ScriptedCapture {
        supported: bool,
        steps: Mutex<VecDeque<Step>>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        log: Log,
    }

    impl ScriptedCapture {
        fn new(steps: Vec<Step>, log: Log) -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                steps: Mutex::new(steps.into()),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                log,
            })
        }
    }

    #[async_trait]
    impl SpeechCapture for ScriptedCapture {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn start(&self, sink: CaptureSink) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push("listen".to_string());
            sink.started();
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Answer(text)) => {
                    sink.result(text, 0.5, false);
                    sink.result(text, 0.9, true);
                    sink.result(text, 0.9, true);
                }
                Some(Step::Drop) => {
                    sink.ended();
                }
                None => {}
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push("stop".to_string());
        }
    }

    /// Takes 200ms per utterance.
    struct PacedVoice {
        log: Log,
    }

    #[async_trait]
    impl SpeechSynthesizer for PacedVoice {
        async fn speak(&self, text: &str, _voice: &VoiceSettings) -> Result<()> {
            self.log.lock().unwrap().push(format!("speak:{text}"));
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.log.lock().unwrap().push("spoken".to_string());
            Ok(())
        }

        fn cancel(&self) {
            self.log.lock().unwrap().push("cancel".to_string());
        }
    }

    /// Never answers within the interview's lifetime.
    struct StuckEvaluator;

    #[async_trait]
    impl Evaluator for StuckEvaluator {
        async fn evaluate(&self, _question: &str, _answer: &str) -> Result<Evaluation> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Evaluation {
                score: 100,
                feedback: "too late".into(),
            })
        }
    }

    fn scoring(score: u8) -> MockEvaluator {
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().returning(move |_, _| {
            Ok(Evaluation {
                score,
                feedback: "noted".into(),
            })
        });
        evaluator
    }

    fn never_follows_up() -> MockFollowUpGenerator {
        let mut generator = MockFollowUpGenerator::new();
        generator.expect_follow_up().returning(|_, _, _| Ok(None));
        generator
    }

    fn saving_once() -> MockFinalizer {
        let mut finalizer = MockFinalizer::new();
        finalizer.expect_finalize().times(1).returning(|_| {
            Ok(FinalizeOutcome {
                success: true,
                location: "/interview/42/feedback".into(),
            })
        });
        finalizer
    }

    /// Saves once and keeps what it was given.
    fn recording(saved: Arc<Mutex<Vec<Turn>>>) -> MockFinalizer {
        let mut finalizer = MockFinalizer::new();
        finalizer.expect_finalize().times(1).returning(move |transcript| {
            *saved.lock().unwrap() = transcript.to_vec();
            Ok(FinalizeOutcome {
                success: true,
                location: "/interview/42/feedback".into(),
            })
        });
        finalizer
    }

    fn runtime(
        questions: &[&str],
        capture: Arc<ScriptedCapture>,
        log: Log,
        evaluator: Arc<dyn Evaluator>,
        follow_up: Arc<dyn FollowUpGenerator>,
        finalizer: MockFinalizer,
    ) -> InterviewRuntime {
        let controller = Controller::new(
            questions.iter().map(|q| q.to_string()).collect(),
            ControllerConfig::default(),
        )
        .with_candidate_name("Ada");
        InterviewRuntime::new(
            controller,
            Capabilities {
                capture,
                synthesizer: Arc::new(PacedVoice { log }),
                evaluator,
                follow_up,
                finalizer: Arc::new(finalizer),
            },
        )
    }

    fn texts(transcript: &[Turn]) -> Vec<&str> {
        transcript.iter().map(|t| t.text.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn full_interview_runs_to_completion() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("I'm Ada."),
                Step::Answer("Eight years of backend work."),
                Step::Answer("Use a mutex."),
                Step::Answer("Measure first."),
            ],
            log.clone(),
        );
        let saved = Arc::new(Mutex::new(Vec::new()));
        let rt = runtime(
            &["How do you share state?", "How do you optimise?"],
            capture.clone(),
            log.clone(),
            Arc::new(scoring(70)),
            Arc::new(never_follows_up()),
            recording(saved.clone()),
        );
        let mut snapshots = rt.handle().subscribe();

        let summary = rt.run().await.unwrap();

        let script = InterviewScript::default();
        let saved = saved.lock().unwrap().clone();
        assert_eq!(texts(&saved), [
            script.welcome_for("Ada").as_str(),
            "I'm Ada.",
            script.background_prompt.as_str(),
            "Eight years of backend work.",
            "How do you share state?",
            "Use a mutex.",
            "How do you optimise?",
            "Measure first.",
        ]);
        let speakers: Vec<Speaker> = saved.iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, [
            Speaker::Interviewer,
            Speaker::Candidate,
            Speaker::Interviewer,
            Speaker::Candidate,
            Speaker::Interviewer,
            Speaker::Candidate,
            Speaker::Interviewer,
            Speaker::Candidate,
        ]);

        assert_eq!(summary.location, "/interview/42/feedback");
        assert_eq!(summary.transcript.len(), 8);
        assert_eq!(&texts(&summary.transcript)[4..], [
            "How do you share state?",
            "Use a mutex.",
            "How do you optimise?",
            "Measure first."
        ]);
        assert_eq!(
            summary
                .transcript
                .iter()
                .filter(|t| t.speaker == Speaker::Candidate)
                .count(),
            4
        );
        assert_eq!(summary.pending_feedback.unwrap().score, 70);
        assert_eq!(capture.starts.load(Ordering::SeqCst), 4);
        assert_eq!(capture.stops.load(Ordering::SeqCst), 4);

        let last = snapshots.borrow_and_update().clone();
        assert_eq!(last.state, ControllerState::Complete);
        assert_eq!(last.phase, Phase::Complete);
        assert!(!last.active);
    }

    #[tokio::test(start_paused = true)]
    async fn never_listens_while_speaking() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("Intro."),
                Step::Drop,
                Step::Answer("Background."),
                Step::Answer("An answer."),
            ],
            log.clone(),
        );
        let rt = runtime(
            &["Q1"],
            capture,
            log.clone(),
            Arc::new(scoring(50)),
            Arc::new(never_follows_up()),
            saving_once(),
        );
        rt.run().await.unwrap();

        let mut speaking = false;
        for entry in log.lock().unwrap().iter() {
            if entry.starts_with("speak:") {
                speaking = true;
            } else if entry == "spoken" {
                speaking = false;
            } else if entry == "listen" {
                assert!(!speaking, "capture started during an utterance");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_capture_restarts_without_touching_transcript() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![Step::Answer("Intro."), Step::Drop, Step::Answer("Background.")],
            log.clone(),
        );
        let mut evaluator = MockEvaluator::new();
        evaluator.expect_evaluate().never();
        let mut generator = MockFollowUpGenerator::new();
        generator.expect_follow_up().never();

        let rt = runtime(
            &[],
            capture.clone(),
            log,
            Arc::new(evaluator),
            Arc::new(generator),
            saving_once(),
        );
        let summary = rt.run().await.unwrap();

        assert_eq!(capture.starts.load(Ordering::SeqCst), 3);
        assert_eq!(summary.transcript.len(), 4);
        assert_eq!(texts(&summary.transcript)[3], "Background.");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_evaluation_does_not_block_the_flow() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("Intro."),
                Step::Answer("Background."),
                Step::Answer("First."),
                Step::Answer("Second."),
            ],
            log.clone(),
        );
        let rt = runtime(
            &["Q1", "Q2"],
            capture,
            log,
            Arc::new(StuckEvaluator),
            Arc::new(never_follows_up()),
            saving_once(),
        );
        let summary = rt.run().await.unwrap();

        assert_eq!(&texts(&summary.transcript)[4..], ["Q1", "First.", "Q2", "Second."]);
        assert!(summary.pending_feedback.is_none());
        assert!(summary.elapsed_seconds < 60);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reviewers_are_absorbed() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("Intro."),
                Step::Answer("Background."),
                Step::Answer("First."),
                Step::Answer("Second."),
            ],
            log.clone(),
        );
        let mut evaluator = MockEvaluator::new();
        evaluator
            .expect_evaluate()
            .times(2)
            .returning(|_, _| Err(anyhow!("rate limited")));
        let mut generator = MockFollowUpGenerator::new();
        generator
            .expect_follow_up()
            .times(2)
            .returning(|_, _, _| Err(anyhow!("connection reset")));

        let rt = runtime(
            &["Q1", "Q2"],
            capture,
            log,
            Arc::new(evaluator),
            Arc::new(generator),
            saving_once(),
        );
        let summary = rt.run().await.unwrap();
        assert_eq!(summary.transcript.len(), 8);
        assert!(summary.pending_feedback.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_score_is_discarded() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("Intro."),
                Step::Answer("Background."),
                Step::Answer("Answer."),
            ],
            log.clone(),
        );
        let rt = runtime(
            &["Q1"],
            capture,
            log,
            Arc::new(scoring(150)),
            Arc::new(never_follows_up()),
            saving_once(),
        );
        let summary = rt.run().await.unwrap();
        assert!(summary.pending_feedback.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_is_asked_once_per_question() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![
                Step::Answer("Intro."),
                Step::Answer("Background."),
                Step::Answer("Queues."),
                Step::Answer("Queues decouple producers from consumers."),
            ],
            log.clone(),
        );
        let mut generator = MockFollowUpGenerator::new();
        generator
            .expect_follow_up()
            .times(1)
            .returning(|_, _, _| Ok(Some("Can you elaborate?".into())));

        let rt = runtime(
            &["Q1"],
            capture,
            log,
            Arc::new(scoring(60)),
            Arc::new(generator),
            saving_once(),
        );
        let summary = rt.run().await.unwrap();
        assert_eq!(&texts(&summary.transcript)[4..], [
            "Q1",
            "Queues.",
            "Can you elaborate?",
            "Queues decouple producers from consumers."
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn finalization_failure_reports_fallback() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![Step::Answer("Intro."), Step::Answer("Background.")],
            log.clone(),
        );
        let mut finalizer = MockFinalizer::new();
        finalizer
            .expect_finalize()
            .times(1)
            .returning(|_| Err(anyhow!("disk full")));

        let rt = runtime(
            &[],
            capture,
            log,
            Arc::new(scoring(50)),
            Arc::new(never_follows_up()),
            finalizer,
        );
        match rt.run().await {
            Err(InterviewError::FinalizationFailed {
                reason,
                fallback_location,
            }) => {
                assert!(reason.contains("disk full"));
                assert_eq!(fallback_location, "/");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_capture_and_finalizes_once() {
        let log = Log::default();
        let capture = ScriptedCapture::new(vec![], log.clone());
        let mut finalizer = MockFinalizer::new();
        finalizer.expect_finalize().times(1).returning(|transcript| {
            assert_eq!(transcript.len(), 1);
            assert_eq!(transcript[0].speaker, Speaker::Interviewer);
            assert!(transcript[0].text.starts_with("Hello Ada!"));
            Ok(FinalizeOutcome {
                success: true,
                location: "/interview/7/feedback".into(),
            })
        });

        let rt = runtime(
            &["Q1"],
            capture.clone(),
            log,
            Arc::new(scoring(50)),
            Arc::new(never_follows_up()),
            finalizer,
        );
        let handle = rt.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.stop();
            handle.stop();
        });

        let summary = rt.run().await.unwrap();
        assert_eq!(summary.location, "/interview/7/feedback");
        assert_eq!(capture.starts.load(Ordering::SeqCst), 1);
        assert_eq!(capture.stops.load(Ordering::SeqCst), 1);
        assert!(summary.elapsed_seconds >= 4);
    }

    /// Takes 100ms to open the microphone.
    #[derive(Default)]
    struct SlowMicrophone {
        open: AtomicBool,
        opened: AtomicUsize,
    }

    #[async_trait]
    impl SpeechCapture for SlowMicrophone {
        fn is_supported(&self) -> bool {
            true
        }

        async fn start(&self, sink: CaptureSink) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.open.store(true, Ordering::SeqCst);
            self.opened.fetch_add(1, Ordering::SeqCst);
            sink.started();
            Ok(())
        }

        fn stop(&self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    /// Takes a second to save.
    struct SlowFinalizer;

    #[async_trait]
    impl Finalizer for SlowFinalizer {
        async fn finalize(&self, _transcript: &[Turn]) -> Result<FinalizeOutcome> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(FinalizeOutcome {
                success: true,
                location: "/interview/9/feedback".into(),
            })
        }
    }

    fn slow_start_runtime(
        microphone: Arc<SlowMicrophone>,
        finalizer: Arc<dyn Finalizer>,
    ) -> InterviewRuntime {
        let controller = Controller::new(vec!["Q1".to_string()], ControllerConfig::default());
        InterviewRuntime::new(
            controller,
            Capabilities {
                capture: microphone,
                synthesizer: Arc::new(PacedVoice {
                    log: Log::default(),
                }),
                evaluator: Arc::new(scoring(50)),
                follow_up: Arc::new(never_follows_up()),
                finalizer,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_microphone_acquisition_closes_it() {
        let microphone = Arc::new(SlowMicrophone::default());
        let rt = slow_start_runtime(microphone.clone(), Arc::new(SlowFinalizer));
        let handle = rt.handle();
        tokio::spawn(async move {
            // The welcome ends at 200ms; the microphone opens at 300ms.
            tokio::time::sleep(Duration::from_millis(250)).await;
            handle.stop();
        });

        let summary = rt.run().await.unwrap();
        assert_eq!(summary.location, "/interview/9/feedback");
        assert_eq!(microphone.opened.load(Ordering::SeqCst), 1);
        assert!(!microphone.open.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn microphone_opening_after_the_interview_ends_is_closed() {
        let microphone = Arc::new(SlowMicrophone::default());
        let rt = slow_start_runtime(microphone.clone(), Arc::new(saving_once()));
        let handle = rt.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            handle.stop();
        });

        rt.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(microphone.opened.load(Ordering::SeqCst), 1);
        assert!(!microphone.open.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_capture_never_starts() {
        let log = Log::default();
        let capture = Arc::new(ScriptedCapture {
            supported: false,
            steps: Mutex::new(VecDeque::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            log: log.clone(),
        });
        let mut finalizer = MockFinalizer::new();
        finalizer.expect_finalize().never();

        let rt = runtime(
            &["Q1"],
            capture.clone(),
            log.clone(),
            Arc::new(scoring(50)),
            Arc::new(never_follows_up()),
            finalizer,
        );
        let handle = rt.handle();
        let err = rt.run().await.unwrap_err();

        assert_eq!(err, InterviewError::UnsupportedEnvironment);
        assert!(log.lock().unwrap().is_empty());
        assert!(!handle.snapshot().active);
        assert_eq!(capture.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_failure_counts_as_finished() {
        let log = Log::default();
        let capture = ScriptedCapture::new(
            vec![Step::Answer("Intro."), Step::Answer("Background.")],
            log.clone(),
        );
        let mut voice = MockSpeechSynthesizer::new();
        voice
            .expect_speak()
            .returning(|_, _| Err(anyhow!("no audio device")));
        voice.expect_cancel().return_const(());

        let controller = Controller::new(Vec::new(), ControllerConfig::default());
        let rt = InterviewRuntime::new(
            controller,
            Capabilities {
                capture: capture.clone(),
                synthesizer: Arc::new(voice),
                evaluator: Arc::new(scoring(50)),
                follow_up: Arc::new(never_follows_up()),
                finalizer: Arc::new(saving_once()),
            },
        );
        let summary = rt.run().await.unwrap();
        assert_eq!(summary.transcript.len(), 4);
        assert_eq!(capture.starts.load(Ordering::SeqCst), 2);
    }
}
