//! Pipeline orchestrator
//!
//! A single task owns the state machine. It consumes capture frames, runs
//! wake word and VAD scoring synchronously per frame, and reacts to
//! transcription results, speak commands and playback completions, all of
//! which arrive over channels from worker tasks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioFrame, AudioInput, AudioSink, FRAME_SAMPLES, SAMPLE_RATE};
use crate::config::Config;
use crate::feedback::{FeedbackCue, FeedbackMode, WaitingChime, WaitingFeedback};
use crate::pipeline::{PipelineEvent, PipelineState};
use crate::speech::{SpeechEngine, SpeechFinished};
use crate::transport::{SpeakCommand, Transport};
use crate::voice::{
    DispatchOutcome, Dispatcher, Segmenter, SegmenterConfig, SegmenterEvent, SttEngine, TtsEngine,
    VadModel, WakeWordEvent, WakeWordModel,
};
use crate::{Error, Result};

/// Cadence of the waiting feedback timers
const FEEDBACK_TICK: Duration = Duration::from_millis(50);

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 256;

/// Models and devices the pipeline drives
pub struct PipelineComponents {
    /// Wake word model; `None` runs without a wake word
    pub wake_word: Option<Box<dyn WakeWordModel>>,
    pub vad: Box<dyn VadModel>,
    pub stt: Arc<dyn SttEngine>,
    pub tts: Arc<dyn TtsEngine>,
    pub sink: Arc<dyn AudioSink>,
    pub transport: Arc<dyn Transport>,
}

/// Observer side of a pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    state: watch::Receiver<PipelineState>,
    events: broadcast::Sender<PipelineEvent>,
    shutdown: CancellationToken,
}

impl PipelineHandle {
    /// Current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Receive events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Ask the pipeline to stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that fires on shutdown
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// The voice pipeline
pub struct Pipeline {
    state: PipelineState,
    state_tx: watch::Sender<PipelineState>,
    events: broadcast::Sender<PipelineEvent>,
    shutdown: CancellationToken,

    segmenter: Segmenter,
    wake_word: Option<Box<dyn WakeWordModel>>,
    vad: Box<dyn VadModel>,
    wake_timeout_frames: u32,
    wake_frames_left: Option<u32>,

    dispatcher: Arc<Dispatcher>,
    dispatch_tx: mpsc::Sender<DispatchOutcome>,
    dispatch_rx: mpsc::Receiver<DispatchOutcome>,

    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    barge_epoch: Arc<AtomicU64>,
    backlog: VecDeque<SpeakCommand>,

    speech: SpeechEngine,
    finished_rx: mpsc::UnboundedReceiver<SpeechFinished>,
    current_generation: Option<u64>,

    feedback_mode: FeedbackMode,
    chime: Option<WaitingChime>,
    phrases: Option<WaitingFeedback>,
}

impl Pipeline {
    /// Wire the pipeline from configuration and components
    #[must_use]
    pub fn new(config: &Config, components: PipelineComponents) -> Self {
        let PipelineComponents {
            wake_word,
            vad,
            stt,
            tts,
            sink,
            transport,
        } = components;

        let wake_word = if config.voice.wake_word_enabled {
            if wake_word.is_none() {
                tracing::warn!("wake word enabled but no model given, listening continuously");
            }
            wake_word
        } else {
            None
        };

        let (state_tx, _) = watch::channel(PipelineState::NotInitialized);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(4);
        let (speech, finished_rx) = SpeechEngine::new(tts, Arc::clone(&sink));

        let feedback_mode = config.feedback.mode;
        let chime = feedback_mode.uses_chime().then(|| {
            WaitingChime::new(config.feedback.earcon_path.as_deref(), Arc::clone(&sink))
                .with_interval(Duration::from_millis(config.feedback.chime_interval_ms))
        });
        let phrases = feedback_mode
            .uses_phrases()
            .then(|| WaitingFeedback::new(config.feedback.clone()));

        Self {
            state: PipelineState::NotInitialized,
            state_tx,
            events,
            shutdown: CancellationToken::new(),

            segmenter: Segmenter::new(SegmenterConfig::from_voice(&config.voice, FRAME_SAMPLES)),
            wake_word,
            vad,
            wake_timeout_frames: frames_for(config.voice.wake_word_timeout_sec),
            wake_frames_left: None,

            dispatcher: Arc::new(Dispatcher::new(
                stt,
                Arc::clone(&transport),
                config.transport.session_id.clone(),
            )),
            dispatch_tx,
            dispatch_rx,

            transport,
            poll_interval: Duration::from_millis(config.transport.poll_interval_ms.max(1)),
            barge_epoch: Arc::new(AtomicU64::new(0)),
            backlog: VecDeque::new(),

            speech,
            finished_rx,
            current_generation: None,

            feedback_mode,
            chime,
            phrases,
        }
    }

    /// Observer handle; take it before calling [`Pipeline::run`]
    #[must_use]
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            state: self.state_tx.subscribe(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Whether utterances need a wake word first
    #[must_use]
    pub const fn wake_word_enabled(&self) -> bool {
        self.wake_word.is_some()
    }

    /// Run until shutdown, the end of the frame stream, or a fatal error
    ///
    /// # Errors
    ///
    /// Returns error if audio capture fails
    pub async fn run(mut self, mut frames: mpsc::Receiver<AudioInput>) -> Result<()> {
        if let Err(e) = self.transport.connect().await {
            tracing::warn!(error = %e, "bridge handshake failed, continuing");
        }

        let (speak_tx, mut speak_rx) = mpsc::channel(8);
        let poller = tokio::spawn(poll_speak(
            Arc::clone(&self.transport),
            speak_tx,
            self.poll_interval,
            Arc::clone(&self.barge_epoch),
            self.shutdown.clone(),
        ));

        let idle = self.idle_state();
        self.set_state(idle);
        tracing::info!(
            wake_word = ?self.wake_word.as_ref().map(|w| w.wake_word()),
            feedback = %self.feedback_mode,
            "pipeline running"
        );

        let mut feedback_tick = tokio::time::interval(FEEDBACK_TICK);
        feedback_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break Ok(()),
                input = frames.recv() => match input {
                    Some(AudioInput::Frame(frame)) => self.handle_frame(&frame),
                    Some(AudioInput::Failed(message)) => {
                        self.fail(&message);
                        break Err(Error::Audio(message));
                    }
                    None => {
                        tracing::debug!("audio input closed");
                        break Ok(());
                    }
                },
                Some(done) = self.finished_rx.recv() => self.handle_speech_finished(done),
                Some((epoch, command)) = speak_rx.recv() => {
                    if epoch == self.barge_epoch.load(Ordering::Acquire) {
                        self.handle_speak(command);
                    } else {
                        tracing::debug!("dropping speak command fetched before barge-in");
                    }
                }
                Some(outcome) = self.dispatch_rx.recv() => self.handle_dispatch(outcome),
                _ = feedback_tick.tick() => self.tick_feedback(),
            }
        };

        self.shutdown.cancel();
        self.stop_feedback();
        self.speech.cancel_speech();
        poller.abort();
        tracing::info!("pipeline stopped");
        result
    }

    const fn idle_state(&self) -> PipelineState {
        if self.wake_word.is_some() {
            PipelineState::WaitingForWakeWord
        } else {
            PipelineState::Listening
        }
    }

    fn set_state(&mut self, to: PipelineState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.state_tx.send_replace(to);
        tracing::debug!(from = %from, to = %to, "state changed");
        self.emit(PipelineEvent::StateChanged { from, to });
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&mut self, message: &str) {
        tracing::error!(error = %message, "audio capture failed");
        self.emit(PipelineEvent::Error {
            message: message.to_string(),
            fatal: true,
        });
        self.set_state(PipelineState::Error);
    }

    /// Route one frame according to the current state
    fn handle_frame(&mut self, frame: &AudioFrame) {
        match self.state {
            PipelineState::WaitingForWakeWord | PipelineState::Speaking => {
                if let Some(event) = self.score_wake_word(frame) {
                    self.handle_wake_word(event);
                }
            }
            PipelineState::Listening => self.handle_listening_frame(frame),
            PipelineState::ProcessingStt | PipelineState::NotInitialized | PipelineState::Error => {}
        }
    }

    fn score_wake_word(&mut self, frame: &AudioFrame) -> Option<WakeWordEvent> {
        let model = self.wake_word.as_mut()?;
        match model.score(frame) {
            Ok(confidence) => self
                .segmenter
                .detect_wake_word(frame, model.wake_word(), confidence),
            Err(e) => {
                tracing::warn!(error = %e, "wake word inference failed, skipping frame");
                None
            }
        }
    }

    fn handle_wake_word(&mut self, event: WakeWordEvent) {
        tracing::info!(
            word = %event.word,
            confidence = event.confidence,
            at_ms = event.at.as_millis(),
            "wake word detected"
        );

        if self.state == PipelineState::Speaking {
            self.barge_in();
        }
        self.stop_feedback();

        if let Some(model) = self.wake_word.as_mut() {
            model.reset();
        }
        self.emit(PipelineEvent::WakeWord(event));
        self.start_listening();
        self.wake_frames_left = Some(self.wake_timeout_frames);
    }

    /// Silence the current response and everything queued behind it
    fn barge_in(&mut self) {
        let interrupted = self.current_generation.take();
        self.speech.cancel_speech();
        self.backlog.clear();
        // The poller drains the bridge before it polls under the new epoch
        self.barge_epoch.fetch_add(1, Ordering::AcqRel);

        if let Some(generation) = interrupted {
            tracing::info!(generation, "barge-in");
            self.emit(PipelineEvent::SpeechInterrupted { generation });
        }
    }

    fn start_listening(&mut self) {
        self.segmenter.reset();
        self.vad.reset();
        self.set_state(PipelineState::Listening);
    }

    fn handle_listening_frame(&mut self, frame: &AudioFrame) {
        let probability = match self.vad.speech_probability(frame) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "VAD inference failed, skipping frame");
                return;
            }
        };

        match self.segmenter.push(frame, probability) {
            Some(SegmenterEvent::SpeechStarted { .. }) => {
                self.wake_frames_left = None;
                self.emit(PipelineEvent::VoiceActivity { active: true });
            }
            Some(SegmenterEvent::SpeechEnded { segment }) => {
                self.emit(PipelineEvent::VoiceActivity { active: false });
                match segment {
                    Some(segment) => {
                        self.set_state(PipelineState::ProcessingStt);
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let tx = self.dispatch_tx.clone();
                        tokio::spawn(async move {
                            let outcome = dispatcher.dispatch(segment).await;
                            let _ = tx.send(outcome).await;
                        });
                    }
                    None => {
                        if self.wake_word.is_some() {
                            self.wake_frames_left = Some(self.wake_timeout_frames);
                        }
                    }
                }
            }
            None => self.check_wake_timeout(),
        }
    }

    fn check_wake_timeout(&mut self) {
        let Some(left) = self.wake_frames_left else {
            return;
        };
        if left > 0 {
            self.wake_frames_left = Some(left - 1);
            return;
        }

        if self.segmenter.buffered_samples() == 0 {
            tracing::debug!("no speech after wake word, going back to waiting");
            self.wake_frames_left = None;
            self.set_state(PipelineState::WaitingForWakeWord);
        }
    }

    fn handle_dispatch(&mut self, outcome: DispatchOutcome) {
        if let Some(text) = outcome.text() {
            self.emit(PipelineEvent::Transcription {
                text: text.to_string(),
                is_final: true,
            });
        }

        match &outcome {
            DispatchOutcome::Sent(message) => {
                if self.state == PipelineState::ProcessingStt {
                    self.start_feedback(&message.text);
                }
            }
            DispatchOutcome::Empty => {}
            DispatchOutcome::SttFailed(error) => self.emit(PipelineEvent::Error {
                message: format!("transcription failed: {error}"),
                fatal: false,
            }),
            DispatchOutcome::SendFailed { error, .. } => self.emit(PipelineEvent::Error {
                message: format!("transcription not delivered: {error}"),
                fatal: false,
            }),
        }

        // A speak command that arrived meanwhile owns the state now
        if self.state == PipelineState::ProcessingStt {
            let idle = self.idle_state();
            if idle == PipelineState::Listening {
                self.start_listening();
            } else {
                self.set_state(idle);
            }
        }
    }

    fn handle_speak(&mut self, command: SpeakCommand) {
        self.stop_feedback();

        if self.current_generation.is_some() {
            if command.interrupt {
                if let Some(generation) = self.current_generation.take() {
                    tracing::info!(generation, "interrupted by new speak command");
                    self.emit(PipelineEvent::SpeechInterrupted { generation });
                }
                self.backlog.clear();
            } else {
                tracing::debug!(queued = self.backlog.len() + 1, "speak command queued");
                self.backlog.push_back(command);
                return;
            }
        }

        self.start_speaking(&command);
    }

    fn start_speaking(&mut self, command: &SpeakCommand) {
        self.segmenter.reset();
        self.wake_frames_left = None;

        let generation = self.speech.speak(&command.text);
        self.current_generation = Some(generation);
        self.emit(PipelineEvent::Speaking {
            text: command.text.clone(),
            generation,
        });
        self.set_state(PipelineState::Speaking);
    }

    fn handle_speech_finished(&mut self, done: SpeechFinished) {
        if self.current_generation != Some(done.generation) {
            tracing::trace!(generation = done.generation, "ignoring stale completion");
            return;
        }
        self.current_generation = None;
        self.speech.clear_finished(done.generation);

        if let Some(next) = self.backlog.pop_front() {
            self.start_speaking(&next);
            return;
        }

        if self.state == PipelineState::Speaking {
            let idle = self.idle_state();
            if idle == PipelineState::Listening {
                self.start_listening();
            } else {
                self.set_state(idle);
            }
        }
    }

    fn start_feedback(&mut self, query: &str) {
        if let Some(chime) = &self.chime {
            chime.start();
        }
        if let Some(phrases) = self.phrases.as_mut() {
            phrases.start(query);
        }
    }

    fn stop_feedback(&mut self) {
        if let Some(chime) = &self.chime {
            chime.stop();
        }
        if let Some(phrases) = self.phrases.as_mut() {
            phrases.stop();
        }
    }

    fn tick_feedback(&mut self) {
        let Some(phrases) = self.phrases.as_mut() else {
            return;
        };
        let Some(token) = phrases.session().map(|s| s.cancel_token()) else {
            return;
        };

        let cues = phrases.update();
        if cues.is_empty() {
            return;
        }

        tokio::spawn(play_cues(cues, self.speech.tts(), self.speech.sink(), token));
    }
}

/// Play feedback cues in order under their session's token
async fn play_cues(
    cues: Vec<FeedbackCue>,
    tts: Arc<dyn TtsEngine>,
    sink: Arc<dyn AudioSink>,
    token: CancellationToken,
) {
    for cue in cues {
        if token.is_cancelled() {
            return;
        }

        let chunk = match cue {
            FeedbackCue::Tone(chunk) => chunk,
            FeedbackCue::Phrase(text) => {
                let tts = Arc::clone(&tts);
                let synthesis = tokio::task::spawn_blocking(move || tts.synthesize(&text));
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    result = synthesis => result,
                };
                match result {
                    Ok(Ok(chunk)) => chunk,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "feedback phrase synthesis failed");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "feedback synthesis task failed");
                        continue;
                    }
                }
            }
        };

        let sink = Arc::clone(&sink);
        let play_token = token.clone();
        let played = tokio::task::spawn_blocking(move || {
            sink.play(&chunk.samples, chunk.sample_rate, &play_token)
        })
        .await;
        if let Ok(Err(e)) = played {
            tracing::warn!(error = %e, "feedback playback failed");
        }
    }
}

/// Poll the transport for speak commands, tagging each with the barge-in epoch
///
/// After a barge-in, replies already waiting on the bridge are discarded
/// before the first poll under the new epoch, so nothing queued before the
/// interruption can be tagged as current.
async fn poll_speak(
    transport: Arc<dyn Transport>,
    tx: mpsc::Sender<(u64, SpeakCommand)>,
    interval: Duration,
    barge_epoch: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut drained_epoch = barge_epoch.load(Ordering::Acquire);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let epoch = barge_epoch.load(Ordering::Acquire);
        if epoch != drained_epoch {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = transport.discard_pending() => {}
            }
            tracing::debug!(epoch, "discarded replies queued before barge-in");
            drained_epoch = epoch;
        }

        let command = tokio::select! {
            () = shutdown.cancelled() => return,
            command = transport.poll_speak() => command,
        };

        if let Some(command) = command {
            if tx.send((epoch, command)).await.is_err() {
                return;
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn frames_for(seconds: f64) -> u32 {
    let frame_sec = FRAME_SAMPLES as f64 / f64::from(SAMPLE_RATE);
    (seconds.max(0.0) / frame_sec).ceil() as u32
}
