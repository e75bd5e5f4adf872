//! Conversation orchestrator
//!
//! Connects all components: recognition -> answer generator -> vocalization
//! and avatar, then back to recognition.
//!
//! None of the devices report reliably, so the orchestrator never waits on a
//! single signal. Every spoken reply races its real end event against a
//! backup timer for the avatar and a watchdog for the synthesizer. Every
//! callback carries the epoch or speech id it was issued under, and anything
//! stale is dropped, which keeps a reset or an interrupted reply from leaking
//! into the next turn.

use crate::avatar::AvatarController;
use crate::avatar::AvatarRenderer;
use crate::capability::{CapabilityProbe, CapabilityVerdict, Environment};
use crate::integration::config::{AnswerFailureMode, KioskConfig};
use crate::integration::session::{ConversationSession, ConversationState};
use crate::llm::prompts::{welcome_line, APOLOGY, DIDNT_CATCH, PLEASE_WAIT};
use crate::llm::AnswerGenerator;
use crate::messages::{Message, Modality};
use crate::speech::stt::{EngineActivity, ErrorKind, RecognitionSignal};
use crate::speech::tts::{SpeakCallbacks, SpeechOutcome};
use crate::speech::{
    estimate_speaking_ms, RecognitionController, RecognitionEngineFactory, Synthesizer,
    VocalizationController,
};
use crate::ui::state::{shared_view, KioskEvent, KioskStatus, KioskView, SharedKioskView};
use crate::utils::{LatencyTracker, TurnTimer};
use crate::{ConciergeError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Actions a front end can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskCommand {
    /// Staff greet a new visitor
    TriggerWelcome,

    /// Drop the conversation and return to idle
    Reset,

    /// Start or stop listening; submits the draft once manual input is engaged
    ToggleMicrophone,

    /// Typed input, handled like a spoken transcript
    SubmitText(String),

    /// Update the manual input draft
    SetDraft(String),

    /// Shutdown the orchestrator
    Shutdown,
}

/// Platform backends the orchestrator drives
#[derive(Clone)]
pub struct KioskDevices {
    pub environment: Arc<dyn Environment>,
    pub recognition: Arc<dyn RecognitionEngineFactory>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub avatar: Arc<dyn AvatarRenderer>,
    pub answers: Arc<dyn AnswerGenerator>,
}

/// Callbacks and timers report back through here
#[derive(Debug)]
enum Internal {
    SpeechStarted {
        speech: u64,
    },
    SpeechFinished {
        speech: u64,
        outcome: SpeechOutcome,
    },
    AvatarBackup {
        speech: u64,
    },
    SpeechWatchdog {
        speech: u64,
    },
    ResumeListening {
        epoch: u64,
    },
    ListenFailed {
        epoch: u64,
        error: ConciergeError,
    },
    AnswerReady {
        epoch: u64,
        turn: u64,
        result: Result<String>,
    },
}

/// What the current utterance is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeechPurpose {
    Welcome,
    Answer,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSpeech {
    id: u64,
    purpose: SpeechPurpose,
}

/// Handle for controlling the orchestrator from the UI
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: UnboundedSender<KioskCommand>,
    event_rx: Receiver<KioskEvent>,
    view: SharedKioskView,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: KioskCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ConciergeError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn trigger_welcome(&self) -> Result<()> {
        self.send_command(KioskCommand::TriggerWelcome)
    }

    pub fn reset(&self) -> Result<()> {
        self.send_command(KioskCommand::Reset)
    }

    pub fn toggle_microphone(&self) -> Result<()> {
        self.send_command(KioskCommand::ToggleMicrophone)
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(KioskCommand::SubmitText(text.into()))
    }

    pub fn set_draft(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(KioskCommand::SetDraft(text.into()))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(KioskCommand::Shutdown)
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<KioskEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn event_receiver(&self) -> Receiver<KioskEvent> {
        self.event_rx.clone()
    }

    pub fn view(&self) -> SharedKioskView {
        Arc::clone(&self.view)
    }
}

/// Main orchestrator that coordinates all components
pub struct Orchestrator {
    config: KioskConfig,
    environment: Arc<dyn Environment>,
    answers: Arc<dyn AnswerGenerator>,
    recognition: RecognitionController,
    vocalizer: VocalizationController,
    avatar: AvatarController,

    session: ConversationSession,
    verdict: Option<CapabilityVerdict>,
    /// Bumped on reset; stale answers and timers compare against it
    epoch: u64,
    speech_seq: u64,
    active_speech: Option<ActiveSpeech>,
    turn_timer: Option<TurnTimer>,
    /// Outstanding answer request; aborted on reset
    answer_task: Option<JoinHandle<()>>,
    latency: LatencyTracker,

    view: SharedKioskView,
    event_tx: Sender<KioskEvent>,
    command_rx: Option<UnboundedReceiver<KioskCommand>>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: Option<UnboundedReceiver<Internal>>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given configuration and backends
    pub fn new(config: KioskConfig, devices: KioskDevices) -> (Self, OrchestratorHandle) {
        let (command_tx, command_rx) = unbounded_channel();
        let (internal_tx, internal_rx) = unbounded_channel();
        let (event_tx, event_rx) = bounded(256);
        let view = shared_view();

        let recognition =
            RecognitionController::new(devices.recognition, config.recognition.clone());
        let vocalizer =
            VocalizationController::new(devices.synthesizer, config.vocalization.clone());
        let avatar = AvatarController::new(devices.avatar, config.avatar.clone());

        let handle = OrchestratorHandle {
            command_tx,
            event_rx,
            view: Arc::clone(&view),
        };

        let orchestrator = Self {
            config,
            environment: devices.environment,
            answers: devices.answers,
            recognition,
            vocalizer,
            avatar,
            session: ConversationSession::new(),
            verdict: None,
            epoch: 0,
            speech_seq: 0,
            active_speech: None,
            turn_timer: None,
            answer_task: None,
            latency: LatencyTracker::new(50),
            view,
            event_tx,
            command_rx: Some(command_rx),
            internal_tx,
            internal_rx: Some(internal_rx),
        };

        (orchestrator, handle)
    }

    pub fn recognition(&self) -> &RecognitionController {
        &self.recognition
    }

    pub fn vocalizer(&self) -> &VocalizationController {
        &self.vocalizer
    }

    pub fn avatar(&self) -> &AvatarController {
        &self.avatar
    }

    /// Spawn the orchestrator loop on the current tokio runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the orchestrator until shutdown
    pub async fn run(mut self) {
        let (Some(mut command_rx), Some(mut internal_rx)) =
            (self.command_rx.take(), self.internal_rx.take())
        else {
            error!("Orchestrator loop already ran");
            return;
        };
        let mut signals = self.recognition.subscribe();

        info!("Orchestrator started");
        self.probe_capabilities().await;
        self.start_devices();

        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(KioskCommand::Shutdown) | None => {
                        info!("Orchestrator shutdown requested");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = internal_rx.recv() => self.handle_internal(event),
                Some(signal) = signals.recv() => self.handle_recognition(signal),
            }
        }

        self.cancel_answer();
        self.vocalizer.stop();
        self.recognition.abort();
        self.emit(KioskEvent::Shutdown);
        info!("Orchestrator stopped");
    }

    async fn probe_capabilities(&mut self) {
        let timeout = Duration::from_millis(self.config.conversation.permission_timeout_ms);
        let verdict = CapabilityProbe::new(self.environment.as_ref())
            .with_permission_timeout(timeout)
            .probe()
            .await;
        self.verdict = Some(verdict);

        self.update_view(|view| view.permission_prompt = verdict.permission_outstanding());
        self.emit(KioskEvent::PermissionPrompt(verdict.permission_outstanding()));
        self.apply_capability();
    }

    /// Offer manual input straight away when voice input cannot work
    fn apply_capability(&mut self) {
        let Some(verdict) = self.verdict else {
            return;
        };
        if let Some(reason) = verdict.unavailable_reason() {
            warn!("Voice input unavailable: {}", reason);
            self.engage_manual_input(reason);
            self.set_status(KioskStatus::Unavailable(reason.to_string()));
        }
    }

    fn start_devices(&self) {
        let avatar = self.avatar.clone();
        tokio::spawn(async move {
            avatar.init().await;
        });

        let vocalizer = self.vocalizer.clone();
        tokio::spawn(async move {
            vocalizer.prime_voices().await;
        });
    }

    fn handle_command(&mut self, cmd: KioskCommand) {
        debug!("Command: {:?}", cmd);
        match cmd {
            KioskCommand::TriggerWelcome => self.trigger_welcome(),
            KioskCommand::Reset => self.reset_conversation(),
            KioskCommand::ToggleMicrophone => self.toggle_microphone(),
            KioskCommand::SubmitText(text) => {
                self.update_view(|view| view.draft.clear());
                self.session.active = true;
                self.on_transcript(text, Modality::Typed, None);
            }
            KioskCommand::SetDraft(text) => self.update_view(|view| view.draft = text),
            KioskCommand::Shutdown => {}
        }
    }

    fn trigger_welcome(&mut self) {
        self.vocalizer.stop();
        self.recognition.stop();
        self.session.begin();
        info!("Welcome triggered (session state: {})", self.session.state);

        let lines = &self.config.conversation.welcome_lines;
        let index = rand::thread_rng().gen_range(0..lines.len().max(1));
        let line = welcome_line(lines, index).unwrap_or_default().to_string();

        self.add_message(Message::assistant(line.clone()));
        self.speak(&line, SpeechPurpose::Welcome);
    }

    fn reset_conversation(&mut self) {
        info!("Resetting conversation");
        self.epoch += 1;
        self.active_speech = None;
        self.turn_timer = None;
        self.cancel_answer();
        self.vocalizer.stop();
        self.recognition.abort();
        self.recognition.reset_counters();
        self.avatar.stop_talking();
        self.session.reset();

        self.update_view(|view| view.clear());
        self.emit(KioskEvent::SessionReset);
        self.set_status(KioskStatus::Idle);
        self.apply_capability();
    }

    fn toggle_microphone(&mut self) {
        if self.session.manual_input_engaged {
            let draft = {
                let mut view = self.view.write();
                std::mem::take(&mut view.draft)
            };
            if draft.trim().is_empty() {
                self.show_notice("Type your question, then press the microphone button.");
            } else {
                self.session.active = true;
                self.on_transcript(draft, Modality::Typed, None);
            }
            return;
        }

        if self.recognition.is_listening() {
            info!("Microphone toggled off");
            self.recognition.stop();
            self.session.state = ConversationState::Idle;
            self.set_status(KioskStatus::Idle);
        } else {
            info!("Microphone toggled on");
            self.session.active = true;
            self.begin_listening();
        }
    }

    fn begin_listening(&mut self) {
        if !self.session.active || self.active_speech.is_some() {
            return;
        }
        if let Some(verdict) = self.verdict {
            if let Some(reason) = verdict.unavailable_reason() {
                self.engage_manual_input(reason);
                return;
            }
        }

        if !self.session.processing {
            self.session.state = ConversationState::Listening;
        }
        if self.recognition.is_listening() {
            return;
        }

        let recognition = self.recognition.clone();
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            if let Err(error) = recognition.start().await {
                let _ = tx.send(Internal::ListenFailed { epoch, error });
            }
        });
    }

    /// Entry point for every visitor utterance, spoken or typed
    fn on_transcript(&mut self, text: String, modality: Modality, confidence: Option<f32>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if !self.session.active {
            debug!("Ignoring transcript outside a session: \"{}\"", text);
            return;
        }
        if self.session.processing {
            info!("Still processing, rejecting \"{}\"", text);
            self.show_notice(PLEASE_WAIT);
            return;
        }

        self.session.accept_transcript();
        let turn = self.session.turn;
        info!("Turn {}: \"{}\" ({:?})", turn, text, modality);

        let mut message = Message::visitor(text.clone(), modality);
        if let Some(confidence) = confidence {
            message = message.with_confidence(confidence);
        }
        self.add_message(message);
        let had_notice = {
            let mut view = self.view.write();
            view.interim = None;
            view.thinking = true;
            view.notice.take().is_some()
        };
        if had_notice {
            self.emit(KioskEvent::NoticeCleared);
        }
        self.emit(KioskEvent::ThinkingChanged(true));
        self.set_status(KioskStatus::Thinking);
        self.turn_timer = Some(TurnTimer::start());

        let answers = Arc::clone(&self.answers);
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        self.answer_task = Some(tokio::spawn(async move {
            let result = answers.answer(&text).await;
            let _ = tx.send(Internal::AnswerReady {
                epoch,
                turn,
                result,
            });
        }));
    }

    /// Drop the outstanding answer request, releasing whatever it holds
    fn cancel_answer(&mut self) {
        if let Some(task) = self.answer_task.take() {
            if !task.is_finished() {
                debug!("Cancelling outstanding answer request");
            }
            task.abort();
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::AnswerReady {
                epoch,
                turn,
                result,
            } => {
                if epoch != self.epoch || turn != self.session.turn || !self.session.processing {
                    debug!("Dropping stale answer for turn {}", turn);
                    return;
                }
                self.on_answer(result);
            }
            Internal::SpeechStarted { speech } => {
                if self.is_active_speech(speech) {
                    self.avatar.start_talking();
                }
            }
            Internal::SpeechFinished { speech, outcome } => {
                if !self.is_active_speech(speech) {
                    debug!("Ignoring end of superseded speech {}", speech);
                    return;
                }
                self.on_speech_finished(outcome);
            }
            Internal::AvatarBackup { speech } => {
                if self.is_active_speech(speech) {
                    debug!("Speaking estimate elapsed, idling avatar");
                    self.avatar.stop_talking();
                }
            }
            Internal::SpeechWatchdog { speech } => {
                if self.is_active_speech(speech) {
                    warn!("No end event for speech {}, stopping synthesizer", speech);
                    self.vocalizer.stop();
                }
            }
            Internal::ResumeListening { epoch } => {
                if epoch != self.epoch || self.session.manual_input_engaged {
                    return;
                }
                self.begin_listening();
            }
            Internal::ListenFailed { epoch, error } => {
                if epoch != self.epoch {
                    return;
                }
                match error {
                    ConciergeError::StartError(e) => {
                        warn!("Listening failed to start: {}", e);
                        self.on_recognition_error(ErrorKind::StartError);
                    }
                    ConciergeError::NotSupported => {
                        self.on_recognition_error(ErrorKind::NotSupported);
                    }
                    other => debug!("Listening ended before it started: {}", other),
                }
            }
        }
    }

    fn on_answer(&mut self, result: Result<String>) {
        self.answer_task = None;
        let answer_ms = self
            .turn_timer
            .as_mut()
            .map(|timer| timer.mark_answered().as_millis() as u64);
        self.update_view(|view| view.thinking = false);
        self.emit(KioskEvent::ThinkingChanged(false));

        match result {
            Ok(text) => {
                let mut message = Message::assistant(text.clone());
                if let Some(ms) = answer_ms {
                    message = message.with_processing_time(ms);
                }
                self.add_message(message);
                self.speak(&text, SpeechPurpose::Answer);
                self.session.answer_dispatched();
            }
            Err(e) => {
                warn!("No answer: {}", e);
                self.turn_timer = None;
                self.session.answer_dispatched();
                match self.config.conversation.answer_failure_mode {
                    AnswerFailureMode::Apologize => {
                        self.add_message(Message::assistant(APOLOGY));
                        self.speak(APOLOGY, SpeechPurpose::Answer);
                    }
                    AnswerFailureMode::Silent => {
                        self.show_notice(&e.user_message());
                        self.schedule_resume();
                    }
                }
            }
        }
    }

    fn speak(&mut self, text: &str, purpose: SpeechPurpose) {
        self.speech_seq += 1;
        let speech = self.speech_seq;
        self.active_speech = Some(ActiveSpeech {
            id: speech,
            purpose,
        });

        // Never listen to ourselves
        self.recognition.stop();
        self.avatar.start_talking();
        self.set_status(KioskStatus::Speaking);

        let conversation = &self.config.conversation;
        let estimate = Duration::from_millis(estimate_speaking_ms(
            text,
            conversation.per_word_ms,
            conversation.min_speaking_ms,
        ));
        let watchdog = estimate + Duration::from_millis(conversation.speech_watchdog_grace_ms);
        debug!(
            "Speech {} ({:?}), estimated {}ms",
            speech,
            purpose,
            estimate.as_millis()
        );

        let start_tx = self.internal_tx.clone();
        let end_tx = self.internal_tx.clone();
        let callbacks = SpeakCallbacks::new()
            .on_start(move || {
                let _ = start_tx.send(Internal::SpeechStarted { speech });
            })
            .on_end(move |outcome| {
                let _ = end_tx.send(Internal::SpeechFinished { speech, outcome });
            });
        self.vocalizer.speak(text, callbacks);

        self.schedule(estimate, Internal::AvatarBackup { speech });
        self.schedule(watchdog, Internal::SpeechWatchdog { speech });
    }

    fn on_speech_finished(&mut self, outcome: SpeechOutcome) {
        let finished = self.active_speech.take();
        debug!("Speech finished: {:?} ({:?})", outcome, finished.map(|s| s.purpose));
        if let SpeechOutcome::Failed(e) = &outcome {
            warn!("Speech output failed: {}", e);
        }

        self.avatar.stop_talking();
        self.recognition.note_response_finished();

        if let Some(timer) = self.turn_timer.take() {
            let metrics = timer.finish();
            self.latency
                .record(Duration::from_millis(metrics.answer_ms));
            info!(
                "Turn latency {} (avg answer {}ms over {} turns)",
                metrics.summary(),
                self.latency.average().as_millis(),
                self.latency.count()
            );
        }

        if self.session.manual_input_engaged {
            self.set_status(KioskStatus::ManualInput);
        } else if self.session.processing {
            self.set_status(KioskStatus::Thinking);
        } else {
            self.set_status(KioskStatus::Idle);
        }
        if self.session.state == ConversationState::WelcomePlaying {
            self.session.state = ConversationState::Listening;
        }
        self.schedule_resume();
    }

    fn schedule_resume(&mut self) {
        if !self.config.conversation.auto_listen || !self.session.active {
            return;
        }
        let delay = Duration::from_millis(self.config.conversation.resume_delay_ms);
        self.schedule(delay, Internal::ResumeListening { epoch: self.epoch });
    }

    fn handle_recognition(&mut self, signal: RecognitionSignal) {
        match signal {
            RecognitionSignal::Started => {
                if let Some(verdict) = self.verdict.as_mut() {
                    if verdict.permission_outstanding() {
                        verdict.record_permission(true);
                        self.update_view(|view| view.permission_prompt = false);
                        self.emit(KioskEvent::PermissionPrompt(false));
                    }
                }
                self.update_view(|view| view.listening = true);
                if !self.session.processing {
                    self.set_status(KioskStatus::Listening);
                }
            }
            RecognitionSignal::Interim(text) => {
                self.update_view(|view| view.interim = Some(text.clone()));
                self.emit(KioskEvent::Interim(text));
            }
            RecognitionSignal::Activity(activity) => match activity {
                EngineActivity::SpeechStart | EngineActivity::SoundStart => {
                    if self.view.read().listening && !self.session.processing {
                        self.set_status(KioskStatus::Hearing);
                    }
                }
                other => debug!("Engine activity: {:?}", other),
            },
            RecognitionSignal::Transcript { text, confidence } => {
                self.on_transcript(text, Modality::Voice, Some(confidence));
            }
            RecognitionSignal::Error(kind) => self.on_recognition_error(kind),
            RecognitionSignal::Ended => {
                self.update_view(|view| {
                    view.listening = false;
                    view.interim = None;
                });
                let status = self.view.read().status.clone();
                if matches!(status, KioskStatus::Listening | KioskStatus::Hearing) {
                    self.set_status(KioskStatus::Idle);
                }
            }
            RecognitionSignal::Restarting { forced } => {
                debug!("Recognition restarting (forced: {})", forced);
            }
        }
    }

    fn on_recognition_error(&mut self, kind: ErrorKind) {
        if !self.session.active {
            debug!("Recognition error outside a session: {}", kind);
            return;
        }

        match kind {
            ErrorKind::Aborted | ErrorKind::NoSpeechExpected | ErrorKind::NoSpeechAfterResponse => {
                debug!("Recognition quiet: {}", kind);
            }
            ErrorKind::NotAllowed => {
                if let Some(verdict) = self.verdict.as_mut() {
                    verdict.record_permission(false);
                }
                self.update_view(|view| view.permission_prompt = false);
                self.emit(KioskEvent::PermissionPrompt(false));
                self.engage_manual_input("microphone access was denied");
            }
            ErrorKind::AudioCapture => self.engage_manual_input("no microphone was found"),
            ErrorKind::NotSupported => {
                self.engage_manual_input("speech recognition is not supported here")
            }
            ErrorKind::Network
            | ErrorKind::NoSpeech
            | ErrorKind::NoSpeechReset
            | ErrorKind::NoMatch
            | ErrorKind::StartError => {
                let threshold = self.config.conversation.manual_input_threshold;
                let escalate = self.session.record_failure(threshold);
                info!(
                    "Recognition failure '{}' ({} in a row)",
                    kind, self.session.failure_count
                );

                let conversation = &self.config.conversation;
                if conversation.announce_recognition_failures
                    && self.session.failure_count >= conversation.announce_after_failures
                {
                    self.add_message(Message::system(DIDNT_CATCH));
                } else {
                    self.show_notice(DIDNT_CATCH);
                }

                if escalate {
                    self.show_manual_input("voice input keeps failing");
                }
            }
        }
    }

    fn engage_manual_input(&mut self, reason: &str) {
        if self.session.engage_manual_input() {
            self.show_manual_input(reason);
        }
    }

    fn show_manual_input(&mut self, reason: &str) {
        info!("Manual input engaged: {}", reason);
        self.recognition.stop();
        self.update_view(|view| view.manual_input_visible = true);
        self.emit(KioskEvent::ManualInputEngaged);
        self.add_message(Message::system(format!(
            "Voice input paused ({}). Please type your question.",
            reason
        )));
        if self.active_speech.is_none() && !self.session.processing {
            self.set_status(KioskStatus::ManualInput);
        }
    }

    fn is_active_speech(&self, speech: u64) -> bool {
        self.active_speech.map(|s| s.id) == Some(speech)
    }

    fn schedule(&self, delay: Duration, event: Internal) {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    fn add_message(&self, message: Message) {
        self.view.read().transcript.add(message.clone());
        self.emit(KioskEvent::MessageAdded(message));
    }

    fn show_notice(&self, notice: &str) {
        self.update_view(|view| view.notice = Some(notice.to_string()));
        self.emit(KioskEvent::Notice(notice.to_string()));
    }

    fn set_status(&self, status: KioskStatus) {
        let changed = {
            let mut view = self.view.write();
            let changed = view.status != status;
            view.status = status.clone();
            changed
        };
        if changed {
            debug!("Status: {}", status.label());
            self.emit(KioskEvent::StatusChanged(status));
        }
    }

    fn update_view(&self, f: impl FnOnce(&mut KioskView)) {
        f(&mut self.view.write());
    }

    fn emit(&self, event: KioskEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event queue full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
