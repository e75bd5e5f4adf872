//! Recognition session controller
//!
//! Owns the single speech recognition engine. Engines only support
//! single-shot sessions and report events unreliably, so this controller:
//! - recreates the engine on every `start()` and waits (bounded) for its
//!   started event
//! - folds engine-specific error strings into [`ErrorKind`]
//! - recodes silence after a closing phrase or right after the avatar spoke,
//!   so normal pauses are not reported as failures
//! - restarts listening by itself in continuous mode, and force-restarts
//!   after runs of the same error
//!
//! Every engine session carries a generation number; events from an older
//! generation are dropped, which is what makes `stop()` safe to call without
//! waiting for the engine to confirm.

use crate::utils::SignalBus;
use crate::{ConciergeError, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the recognition controller
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Recognition locale, e.g. `en-US`
    pub locale: String,

    /// Restart listening after every terminal event
    pub continuous: bool,

    /// Wait after speech-end before finalising a trailing interim transcript
    pub silence_threshold_ms: u64,

    /// How long to wait for the engine's started event
    pub start_timeout_ms: u64,

    /// Pause before an automatic restart; doubles with each consecutive error
    pub restart_delay_ms: u64,

    /// Upper bound for the backed-off restart delay
    pub max_restart_delay_ms: u64,

    /// Consecutive no-speech errors before a forced restart
    pub no_speech_reset_threshold: u32,

    /// Consecutive same-kind errors before a forced restart
    pub error_restart_threshold: u32,

    /// Grace window after a closing phrase like "thanks"
    pub ending_phrase_window_ms: u64,

    /// Grace window after the avatar stops speaking
    pub after_response_window_ms: u64,

    /// Closing phrases that predict a natural silence
    pub ending_phrases: Vec<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            continuous: true,
            silence_threshold_ms: 1500,
            start_timeout_ms: 5000,
            restart_delay_ms: 300,
            max_restart_delay_ms: 5000,
            no_speech_reset_threshold: 3,
            error_restart_threshold: 4,
            ending_phrase_window_ms: 8000,
            after_response_window_ms: 5000,
            ending_phrases: DEFAULT_ENDING_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl RecognitionConfig {
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_start_timeout_ms(mut self, timeout: u64) -> Self {
        self.start_timeout_ms = timeout;
        self
    }

    pub fn with_silence_threshold_ms(mut self, ms: u64) -> Self {
        self.silence_threshold_ms = ms;
        self
    }

    pub fn with_restart_delay_ms(mut self, base: u64, max: u64) -> Self {
        self.restart_delay_ms = base;
        self.max_restart_delay_ms = max;
        self
    }
}

const DEFAULT_ENDING_PHRASES: &[&str] = &[
    "thanks",
    "thank you",
    "thank you very much",
    "thanks a lot",
    "cheers",
    "bye",
    "bye bye",
    "goodbye",
    "see you",
    "that's all",
    "that is all",
];

/// Normalised recognition error vocabulary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    NotAllowed,
    Aborted,
    AudioCapture,
    NoSpeech,
    /// Too many no-speech errors in a row; the controller force-restarted
    NoSpeechReset,
    /// Silence right after a closing phrase
    NoSpeechExpected,
    /// Silence right after the avatar finished speaking
    NoSpeechAfterResponse,
    NotSupported,
    StartError,
    NoMatch,
}

impl ErrorKind {
    /// Collapse an engine-specific error string
    pub fn from_engine(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "network" => ErrorKind::Network,
            "not-allowed" | "service-not-allowed" | "permission-denied" => ErrorKind::NotAllowed,
            "aborted" => ErrorKind::Aborted,
            "audio-capture" => ErrorKind::AudioCapture,
            "no-speech" => ErrorKind::NoSpeech,
            "language-not-supported" | "bad-grammar" | "not-supported" => ErrorKind::NotSupported,
            "no-match" | "nomatch" => ErrorKind::NoMatch,
            other => {
                debug!("Unknown recognition error '{}', treating as aborted", other);
                ErrorKind::Aborted
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::NotAllowed => "not-allowed",
            ErrorKind::Aborted => "aborted",
            ErrorKind::AudioCapture => "audio-capture",
            ErrorKind::NoSpeech => "no-speech",
            ErrorKind::NoSpeechReset => "no-speech-reset",
            ErrorKind::NoSpeechExpected => "no-speech-expected",
            ErrorKind::NoSpeechAfterResponse => "no-speech-after-response",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::StartError => "start-error",
            ErrorKind::NoMatch => "no-match",
        }
    }

    /// Errors only a person can fix; never restarted automatically
    pub fn needs_user_action(&self) -> bool {
        matches!(self, ErrorKind::NotAllowed | ErrorKind::AudioCapture)
    }

    /// Silence that was expected and is not a failure
    pub fn is_suppressed(&self) -> bool {
        matches!(
            self,
            ErrorKind::NoSpeechExpected | ErrorKind::NoSpeechAfterResponse
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw events an engine reports
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Start,
    Result {
        transcript: String,
        confidence: f32,
        is_final: bool,
    },
    End,
    /// Engine-specific error string
    Error(String),
    NoMatch,
    SpeechStart,
    SpeechEnd,
    SoundStart,
    SoundEnd,
    AudioStart,
    AudioEnd,
}

/// Non-terminal engine activity, forwarded for UI feedback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineActivity {
    SpeechStart,
    SpeechEnd,
    SoundStart,
    SoundEnd,
    AudioStart,
    AudioEnd,
}

/// Where an engine delivers its events; bound to one engine session
#[derive(Clone, Debug)]
pub struct EngineEventSink {
    generation: u64,
    tx: UnboundedSender<(u64, EngineEvent)>,
}

impl EngineEventSink {
    /// Deliver an event; returns false once the controller is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// A speech recognition engine instance
pub trait RecognitionEngine: Send {
    /// Begin a listening session; an error here is a synchronous start failure
    fn start(&mut self, sink: EngineEventSink) -> Result<()>;

    /// Ask the engine to finish gracefully
    fn stop(&mut self);

    /// Drop the session immediately
    fn abort(&mut self);
}

/// Builds engine instances; one per listening session
pub trait RecognitionEngineFactory: Send + Sync {
    /// Whether an engine can be constructed in this environment at all
    fn is_supported(&self) -> bool;

    fn create(&self, config: &RecognitionConfig) -> Result<Box<dyn RecognitionEngine>>;
}

/// Normalised signals published to subscribers
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionSignal {
    Started,
    Interim(String),
    Transcript { text: String, confidence: f32 },
    Activity(EngineActivity),
    Error(ErrorKind),
    /// The listening session is over, whatever the reason
    Ended,
    Restarting { forced: bool },
}

/// Why no-speech errors are currently being recoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    EndingPhrase,
    AfterResponse,
}

impl SuppressReason {
    fn recoded(&self) -> ErrorKind {
        match self {
            SuppressReason::EndingPhrase => ErrorKind::NoSpeechExpected,
            SuppressReason::AfterResponse => ErrorKind::NoSpeechAfterResponse,
        }
    }
}

/// Observable recognition state
#[derive(Clone, Debug, Default)]
pub struct RecognitionState {
    pub listening: bool,
    pub continuous_mode: bool,
    pub silence_threshold_ms: u64,
    pub last_utterance: String,
    pub consecutive_error_counts: HashMap<ErrorKind, u32>,
    pub suppress_no_speech_until: Option<(Instant, SuppressReason)>,
}

/// Whether `text` ends a conversation, by exact or suffix match
pub fn is_ending_phrase(text: &str, phrases: &[String]) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    if normalized.is_empty() {
        return false;
    }

    phrases.iter().any(|phrase| {
        let phrase = phrase.to_lowercase();
        normalized == phrase
            || normalized
                .strip_suffix(phrase.as_str())
                .map(|head| head.ends_with(|c: char| c.is_whitespace() || c == ','))
                .unwrap_or(false)
    })
}

struct Inner {
    config: RecognitionConfig,
    state: RecognitionState,
    engine: Option<Box<dyn RecognitionEngine>>,
    generation: u64,
    /// Engine started and no terminal event yet
    session_open: bool,
    /// Cleared by an explicit stop; restarts only happen while set
    keep_alive: bool,
    restart_blocked: bool,
    force_restart: bool,
    pending_start: Option<oneshot::Sender<()>>,
    interim: Option<String>,
    silence_finalized: Option<String>,
    events_tx: UnboundedSender<(u64, EngineEvent)>,
    events_rx: Option<UnboundedReceiver<(u64, EngineEvent)>>,
}

/// Outcome of a single engine event, applied after the lock is released
#[derive(Default)]
struct Effects {
    signals: Vec<RecognitionSignal>,
    restart: Option<bool>,
    silence_timer: Option<(u64, String)>,
}

#[derive(Clone)]
pub struct RecognitionController {
    factory: Arc<dyn RecognitionEngineFactory>,
    inner: Arc<Mutex<Inner>>,
    bus: SignalBus<RecognitionSignal>,
}

impl RecognitionController {
    pub fn new(factory: Arc<dyn RecognitionEngineFactory>, config: RecognitionConfig) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let state = RecognitionState {
            continuous_mode: config.continuous,
            silence_threshold_ms: config.silence_threshold_ms,
            ..Default::default()
        };

        Self {
            factory,
            inner: Arc::new(Mutex::new(Inner {
                config,
                state,
                engine: None,
                generation: 0,
                session_open: false,
                keep_alive: false,
                restart_blocked: false,
                force_restart: false,
                pending_start: None,
                interim: None,
                silence_finalized: None,
                events_tx,
                events_rx: Some(events_rx),
            })),
            bus: SignalBus::new(),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<RecognitionSignal> {
        self.bus.subscribe()
    }

    pub fn is_supported(&self) -> bool {
        self.factory.is_supported()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.lock().state.listening
    }

    pub fn state(&self) -> RecognitionState {
        self.inner.lock().state.clone()
    }

    pub fn set_continuous(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.state.continuous_mode = enabled;
        debug!("Continuous listening {}", if enabled { "on" } else { "off" });
    }

    pub fn set_silence_threshold(&self, ms: u64) {
        self.inner.lock().state.silence_threshold_ms = ms;
    }

    /// Arm the post-response grace window; call when vocalization ends
    pub fn note_response_finished(&self) {
        let mut inner = self.inner.lock();
        let window = Duration::from_millis(inner.config.after_response_window_ms);
        arm_suppression(&mut inner.state, window, SuppressReason::AfterResponse);
    }

    pub fn reset_counters(&self) {
        let mut inner = self.inner.lock();
        inner.state.consecutive_error_counts.clear();
        inner.state.suppress_no_speech_until = None;
        inner.state.last_utterance.clear();
    }

    /// Start a listening session.
    ///
    /// Resolves `Ok(false)` if a session is already running, `Ok(true)` once
    /// the engine reports it started.
    pub async fn start(&self) -> Result<bool> {
        if !self.factory.is_supported() {
            return Err(ConciergeError::NotSupported);
        }

        let (started_rx, generation, timeout) = {
            let mut inner = self.inner.lock();
            if inner.state.listening || inner.session_open {
                debug!("Recognition already running, ignoring start");
                return Ok(false);
            }
            self.ensure_pump(&mut inner);

            let mut engine = self
                .factory
                .create(&inner.config)
                .map_err(|e| ConciergeError::StartError(e.to_string()))?;

            inner.generation += 1;
            let generation = inner.generation;
            let (started_tx, started_rx) = oneshot::channel();
            inner.pending_start = Some(started_tx);
            inner.session_open = true;
            inner.keep_alive = true;
            inner.restart_blocked = false;
            inner.force_restart = false;
            inner.interim = None;

            let sink = EngineEventSink {
                generation,
                tx: inner.events_tx.clone(),
            };
            if let Err(e) = engine.start(sink) {
                warn!("Recognition engine refused to start: {}", e);
                inner.session_open = false;
                inner.pending_start = None;
                inner.generation += 1;
                return Err(ConciergeError::StartError(e.to_string()));
            }
            inner.engine = Some(engine);

            let timeout = Duration::from_millis(inner.config.start_timeout_ms);
            (started_rx, generation, timeout)
        };

        match tokio::time::timeout(timeout, started_rx).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => Err(ConciergeError::Recognition(
                "session ended before the engine started".to_string(),
            )),
            Err(_) => {
                self.abandon_start(generation);
                Err(ConciergeError::StartError(format!(
                    "engine did not start within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Finish the session gracefully; idempotent
    pub fn stop(&self) {
        self.end_session(false);
    }

    /// Drop the session immediately; idempotent
    pub fn abort(&self) {
        self.end_session(true);
    }

    fn end_session(&self, abort: bool) {
        let was_open = {
            let mut inner = self.inner.lock();
            inner.keep_alive = false;
            let was_open = inner.session_open || inner.state.listening;
            if let Some(mut engine) = inner.engine.take() {
                if abort {
                    engine.abort();
                } else {
                    engine.stop();
                }
            }
            inner.session_open = false;
            inner.state.listening = false;
            inner.pending_start = None;
            inner.interim = None;
            inner.generation += 1;
            was_open
        };

        if was_open {
            debug!("Recognition {}", if abort { "aborted" } else { "stopped" });
            self.bus.emit(RecognitionSignal::Ended);
        }
    }

    fn abandon_start(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        warn!("Recognition engine never reported start, abandoning session");
        if let Some(mut engine) = inner.engine.take() {
            engine.abort();
        }
        inner.session_open = false;
        inner.state.listening = false;
        inner.pending_start = None;
        inner.generation += 1;
    }

    fn ensure_pump(&self, inner: &mut Inner) {
        if let Some(mut rx) = inner.events_rx.take() {
            let controller = self.clone();
            tokio::spawn(async move {
                while let Some((generation, event)) = rx.recv().await {
                    controller.handle_engine_event(generation, event);
                }
            });
        }
    }

    fn handle_engine_event(&self, generation: u64, event: EngineEvent) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if generation != inner.generation || !inner.session_open {
                debug!("Dropping stale engine event {:?}", event);
                return;
            }

            match event {
                EngineEvent::Start => {
                    inner.state.listening = true;
                    if let Some(tx) = inner.pending_start.take() {
                        let _ = tx.send(());
                    }
                    info!("Listening");
                    effects.signals.push(RecognitionSignal::Started);
                }
                EngineEvent::Result {
                    transcript,
                    confidence,
                    is_final,
                } => {
                    if is_final {
                        accept_final(&mut inner, transcript, confidence, &mut effects);
                    } else if !transcript.trim().is_empty() {
                        inner.interim = Some(transcript.clone());
                        effects.signals.push(RecognitionSignal::Interim(transcript));
                    }
                }
                EngineEvent::NoMatch => {
                    register_error(&mut inner, ErrorKind::NoMatch, &mut effects);
                }
                EngineEvent::Error(raw) => {
                    let kind = ErrorKind::from_engine(&raw);
                    register_error(&mut inner, kind, &mut effects);
                    close_session(&mut inner, &mut effects);
                }
                EngineEvent::End => {
                    close_session(&mut inner, &mut effects);
                }
                EngineEvent::SpeechEnd => {
                    if let Some(interim) = inner.interim.clone() {
                        effects.silence_timer = Some((generation, interim));
                    }
                    effects
                        .signals
                        .push(RecognitionSignal::Activity(EngineActivity::SpeechEnd));
                }
                EngineEvent::SpeechStart => effects
                    .signals
                    .push(RecognitionSignal::Activity(EngineActivity::SpeechStart)),
                EngineEvent::SoundStart => effects
                    .signals
                    .push(RecognitionSignal::Activity(EngineActivity::SoundStart)),
                EngineEvent::SoundEnd => effects
                    .signals
                    .push(RecognitionSignal::Activity(EngineActivity::SoundEnd)),
                EngineEvent::AudioStart => effects
                    .signals
                    .push(RecognitionSignal::Activity(EngineActivity::AudioStart)),
                EngineEvent::AudioEnd => effects
                    .signals
                    .push(RecognitionSignal::Activity(EngineActivity::AudioEnd)),
            }
        }

        self.apply(effects);
    }

    fn apply(&self, effects: Effects) {
        for signal in effects.signals {
            self.bus.emit(signal);
        }
        if let Some((generation, interim)) = effects.silence_timer {
            self.schedule_silence_finalize(generation, interim);
        }
        if let Some(forced) = effects.restart {
            self.schedule_restart(forced);
        }
    }

    fn schedule_silence_finalize(&self, generation: u64, interim: String) {
        let controller = self.clone();
        let threshold = Duration::from_millis(self.inner.lock().state.silence_threshold_ms);
        tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            let mut effects = Effects::default();
            {
                let mut inner = controller.inner.lock();
                let still_pending = inner.generation == generation
                    && inner.session_open
                    && inner.interim.as_deref() == Some(interim.as_str());
                if !still_pending {
                    return;
                }
                debug!("Silence threshold passed, finalising interim transcript");
                inner.silence_finalized = Some(interim.clone());
                accept_final(&mut inner, interim, 0.0, &mut effects);
            }
            controller.apply(effects);
        });
    }

    fn schedule_restart(&self, forced: bool) {
        let (generation, delay) = {
            let inner = self.inner.lock();
            let failures = inner
                .state
                .consecutive_error_counts
                .values()
                .copied()
                .max()
                .unwrap_or(0);
            let delay = restart_delay(
                inner.config.restart_delay_ms,
                inner.config.max_restart_delay_ms,
                failures,
            );
            (inner.generation, delay)
        };
        debug!("Restart scheduled in {}ms", delay.as_millis());
        self.bus.emit(RecognitionSignal::Restarting { forced });

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let inner = controller.inner.lock();
                let still_wanted = inner.generation == generation
                    && inner.keep_alive
                    && !inner.session_open
                    && (forced || inner.state.continuous_mode);
                if !still_wanted {
                    debug!("Restart no longer wanted");
                    return;
                }
            }

            info!("Restarting recognition (forced: {})", forced);
            match controller.start().await {
                Ok(_) => {}
                Err(ConciergeError::NotSupported) => controller
                    .bus
                    .emit(RecognitionSignal::Error(ErrorKind::NotSupported)),
                Err(ConciergeError::StartError(e)) => {
                    warn!("Automatic restart failed: {}", e);
                    controller
                        .bus
                        .emit(RecognitionSignal::Error(ErrorKind::StartError));
                }
                Err(e) => debug!("Automatic restart ended early: {}", e),
            }
        });
    }
}

/// Exponential backoff: `base` for the first failure, doubling per further one, capped at `max`
fn restart_delay(base: u64, max: u64, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let ms = base.saturating_mul(1u64 << exponent).min(max.max(base));
    Duration::from_millis(ms)
}

fn arm_suppression(state: &mut RecognitionState, window: Duration, reason: SuppressReason) {
    let until = Instant::now() + window;
    let keep_existing = matches!(state.suppress_no_speech_until, Some((existing, _)) if existing > until);
    if !keep_existing {
        debug!("Suppressing no-speech for {:?} ({:?})", window, reason);
        state.suppress_no_speech_until = Some((until, reason));
    }
}

fn accept_final(inner: &mut Inner, transcript: String, confidence: f32, effects: &mut Effects) {
    let text = transcript.trim().to_string();
    inner.interim = None;
    if text.is_empty() {
        return;
    }
    if confidence > 0.0 && inner.silence_finalized.as_deref() == Some(text.as_str()) {
        debug!("Final result repeats a silence-finalised transcript, dropping");
        inner.silence_finalized = None;
        return;
    }

    inner.state.consecutive_error_counts.clear();
    inner.state.last_utterance = text.clone();
    if is_ending_phrase(&text, &inner.config.ending_phrases) {
        let window = Duration::from_millis(inner.config.ending_phrase_window_ms);
        arm_suppression(&mut inner.state, window, SuppressReason::EndingPhrase);
    }

    info!("Heard: \"{}\" ({:.2})", text, confidence);
    effects
        .signals
        .push(RecognitionSignal::Transcript { text, confidence });
}

fn register_error(inner: &mut Inner, kind: ErrorKind, effects: &mut Effects) {
    let mut kind = kind;

    if kind == ErrorKind::NoSpeech {
        if let Some((until, reason)) = inner.state.suppress_no_speech_until {
            if Instant::now() < until {
                kind = reason.recoded();
            } else {
                inner.state.suppress_no_speech_until = None;
            }
        }
    }

    match kind {
        ErrorKind::NoSpeechExpected | ErrorKind::NoSpeechAfterResponse | ErrorKind::Aborted => {}
        ErrorKind::NotAllowed | ErrorKind::AudioCapture | ErrorKind::NotSupported => {
            inner.restart_blocked = true;
            inner.keep_alive = false;
        }
        _ => {
            let threshold = if kind == ErrorKind::NoSpeech {
                inner.config.no_speech_reset_threshold
            } else {
                inner.config.error_restart_threshold
            };
            let counts = &mut inner.state.consecutive_error_counts;
            counts.retain(|k, _| *k == kind);
            let count = counts.entry(kind).or_insert(0);
            *count += 1;

            if threshold > 0 && *count >= threshold {
                warn!("{} consecutive '{}' errors, forcing a restart", count, kind);
                counts.clear();
                inner.force_restart = true;
                if kind == ErrorKind::NoSpeech {
                    kind = ErrorKind::NoSpeechReset;
                }
            }
        }
    }

    debug!("Recognition error: {}", kind);
    effects.signals.push(RecognitionSignal::Error(kind));
}

fn close_session(inner: &mut Inner, effects: &mut Effects) {
    inner.session_open = false;
    inner.state.listening = false;
    inner.pending_start = None;
    inner.interim = None;
    inner.engine = None;
    effects.signals.push(RecognitionSignal::Ended);

    let forced = std::mem::take(&mut inner.force_restart);
    if inner.keep_alive && !inner.restart_blocked && (forced || inner.state.continuous_mode) {
        effects.restart = Some(forced);
    }
}
