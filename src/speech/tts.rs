//! Vocalization controller
//!
//! Speaks one request at a time through a platform [`Synthesizer`]. A request
//! is split into sentences that are queued one by one; a new `speak()`
//! cancels whatever is playing. Each request reports its end exactly once,
//! whether it completed, failed or was interrupted.

use crate::speech::chunker::{select_voice, split_sentences, TextChunk, Voice};
use crate::Result;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Configuration for the vocalization controller
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VocalizationConfig {
    /// Language used to pick a voice
    pub lang: String,

    /// Speech rate (1.0 = normal)
    pub rate: f32,

    pub pitch: f32,

    pub volume: f32,

    /// Queue sentence by sentence instead of one long utterance
    pub split_sentences: bool,

    /// Interval between voice list polls while voices load
    pub voice_poll_interval_ms: u64,

    /// Give up waiting for voices after this many polls
    pub voice_poll_attempts: u32,
}

impl Default for VocalizationConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            split_sentences: true,
            voice_poll_interval_ms: 250,
            voice_poll_attempts: 20,
        }
    }
}

impl VocalizationConfig {
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }
}

/// One utterance handed to the synthesizer
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Events a synthesizer reports for an utterance
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisEvent {
    Start,
    End,
    Error(String),
}

/// Where a synthesizer reports on one utterance
#[derive(Clone, Debug)]
pub struct SynthesisSink {
    request: u64,
    chunk: usize,
    tx: UnboundedSender<(u64, usize, SynthesisEvent)>,
}

impl SynthesisSink {
    pub fn emit(&self, event: SynthesisEvent) -> bool {
        self.tx.send((self.request, self.chunk, event)).is_ok()
    }
}

/// Platform speech synthesizer
pub trait Synthesizer: Send + Sync {
    /// Currently installed voices; may be empty while they load
    fn voices(&self) -> Vec<Voice>;

    /// Queue an utterance; events go to `sink`
    fn speak(&self, utterance: Utterance, sink: SynthesisSink) -> Result<()>;

    /// Drop the current and all queued utterances
    fn cancel(&self);
}

/// How a speak request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    /// Replaced by another request or stopped
    Interrupted,
    /// At least one sentence failed to play
    Failed(String),
}

pub type StartCallback = Box<dyn FnOnce() + Send>;
pub type EndCallback = Box<dyn FnOnce(SpeechOutcome) + Send>;

#[derive(Default)]
pub struct SpeakCallbacks {
    pub on_start: Option<StartCallback>,
    pub on_end: Option<EndCallback>,
}

impl SpeakCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnOnce(SpeechOutcome) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

struct ActiveRequest {
    id: u64,
    pending: VecDeque<TextChunk>,
    current: Option<usize>,
    error: Option<String>,
    on_start: Option<StartCallback>,
    on_end: Option<EndCallback>,
}

impl ActiveRequest {
    fn finish(mut self, outcome: SpeechOutcome) {
        debug!("Speak request {} ended: {:?}", self.id, outcome);
        if let Some(on_end) = self.on_end.take() {
            on_end(outcome);
        }
    }
}

struct Inner {
    active: Option<ActiveRequest>,
    next_id: u64,
    voice: Option<Voice>,
    events_tx: UnboundedSender<(u64, usize, SynthesisEvent)>,
    events_rx: Option<UnboundedReceiver<(u64, usize, SynthesisEvent)>>,
}

#[derive(Clone)]
pub struct VocalizationController {
    synth: Arc<dyn Synthesizer>,
    config: VocalizationConfig,
    inner: Arc<Mutex<Inner>>,
}

impl VocalizationController {
    pub fn new(synth: Arc<dyn Synthesizer>, config: VocalizationConfig) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            synth,
            config,
            inner: Arc::new(Mutex::new(Inner {
                active: None,
                next_id: 0,
                voice: None,
                events_tx,
                events_rx: Some(events_rx),
            })),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    pub fn voice(&self) -> Option<Voice> {
        self.inner.lock().voice.clone()
    }

    /// Wait for the synthesizer's voice list and pick a voice from it.
    ///
    /// Voice lists often load late, so poll a bounded number of times.
    pub async fn prime_voices(&self) -> Option<Voice> {
        for attempt in 0..self.config.voice_poll_attempts.max(1) {
            if let Some(voice) = self.choose_voice() {
                info!("Using voice {} ({})", voice.name, voice.lang);
                return Some(voice);
            }
            debug!("No voices yet (attempt {})", attempt + 1);
            tokio::time::sleep(Duration::from_millis(self.config.voice_poll_interval_ms)).await;
        }
        warn!("No synthesizer voices after polling, using platform default");
        None
    }

    fn choose_voice(&self) -> Option<Voice> {
        let voice = select_voice(&self.synth.voices(), &self.config.lang)?;
        self.inner.lock().voice = Some(voice.clone());
        Some(voice)
    }

    /// Speak `text`, interrupting anything currently playing. Returns the request id.
    pub fn speak(&self, text: &str, callbacks: SpeakCallbacks) -> u64 {
        let chunks: VecDeque<TextChunk> = if self.config.split_sentences {
            split_sentences(text).into()
        } else if text.trim().is_empty() {
            VecDeque::new()
        } else {
            VecDeque::from(vec![TextChunk::new(text.trim(), 0)])
        };

        if self.inner.lock().voice.is_none() {
            self.choose_voice();
        }

        let (id, interrupted) = {
            let mut inner = self.inner.lock();
            self.ensure_pump(&mut inner);
            inner.next_id += 1;
            (inner.next_id, inner.active.take())
        };

        if let Some(previous) = interrupted {
            self.synth.cancel();
            previous.finish(SpeechOutcome::Interrupted);
        }

        if chunks.is_empty() {
            debug!("Nothing to speak for request {}", id);
            if let Some(on_end) = callbacks.on_end {
                on_end(SpeechOutcome::Completed);
            }
            return id;
        }

        debug!("Speak request {}: {} sentence(s)", id, chunks.len());
        self.inner.lock().active = Some(ActiveRequest {
            id,
            pending: chunks,
            current: None,
            error: None,
            on_start: callbacks.on_start,
            on_end: callbacks.on_end,
        });
        self.feed_next(id);
        id
    }

    /// Cancel whatever is playing; idempotent
    pub fn stop(&self) {
        let interrupted = self.inner.lock().active.take();
        self.synth.cancel();
        if let Some(request) = interrupted {
            request.finish(SpeechOutcome::Interrupted);
        }
    }

    fn ensure_pump(&self, inner: &mut Inner) {
        if let Some(mut rx) = inner.events_rx.take() {
            let controller = self.clone();
            tokio::spawn(async move {
                while let Some((request, chunk, event)) = rx.recv().await {
                    controller.handle_event(request, chunk, event);
                }
            });
        }
    }

    fn feed_next(&self, id: u64) {
        let next = {
            let mut inner = self.inner.lock();
            let voice = inner.voice.clone();
            let tx = inner.events_tx.clone();
            match inner.active.as_mut() {
                Some(active) if active.id == id => active.pending.pop_front().map(|chunk| {
                    active.current = Some(chunk.index);
                    let utterance = Utterance {
                        text: chunk.text,
                        voice,
                        lang: self.config.lang.clone(),
                        rate: self.config.rate,
                        pitch: self.config.pitch,
                        volume: self.config.volume,
                    };
                    let sink = SynthesisSink {
                        request: id,
                        chunk: chunk.index,
                        tx,
                    };
                    (utterance, sink)
                }),
                _ => None,
            }
        };

        if let Some((utterance, sink)) = next {
            let chunk = sink.chunk;
            if let Err(e) = self.synth.speak(utterance, sink) {
                self.handle_event(id, chunk, SynthesisEvent::Error(e.to_string()));
            }
        }
    }

    fn handle_event(&self, request: u64, chunk: usize, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Start => {
                let on_start = {
                    let mut inner = self.inner.lock();
                    match inner.active.as_mut() {
                        Some(active) if active.id == request => active.on_start.take(),
                        _ => None,
                    }
                };
                if let Some(on_start) = on_start {
                    on_start();
                }
            }
            SynthesisEvent::End => self.advance(request, chunk, None),
            SynthesisEvent::Error(e) => {
                warn!("Synthesis error on sentence {}: {}", chunk, e);
                self.advance(request, chunk, Some(e));
            }
        }
    }

    fn advance(&self, request: u64, chunk: usize, error: Option<String>) {
        let finished = {
            let mut inner = self.inner.lock();
            let is_current = matches!(
                inner.active.as_ref(),
                Some(active) if active.id == request && active.current == Some(chunk)
            );
            if !is_current {
                debug!("Ignoring stale synthesis event for {}:{}", request, chunk);
                return;
            }

            let done = match inner.active.as_mut() {
                Some(active) => {
                    active.current = None;
                    if error.is_some() {
                        active.error = error;
                    }
                    active.pending.is_empty()
                }
                None => false,
            };
            if done {
                inner.active.take()
            } else {
                None
            }
        };

        match finished {
            Some(mut request) => {
                let outcome = match request.error.take() {
                    Some(e) => SpeechOutcome::Failed(e),
                    None => SpeechOutcome::Completed,
                };
                request.finish(outcome);
            }
            None => self.feed_next(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConciergeError;

    #[derive(Default)]
    struct FakeSynth {
        voices: Mutex<Vec<Voice>>,
        spoken: Mutex<Vec<(Utterance, SynthesisSink)>>,
        cancels: Mutex<usize>,
        fail_speak: bool,
    }

    impl FakeSynth {
        fn last_sink(&self) -> SynthesisSink {
            self.spoken.lock().last().unwrap().1.clone()
        }

        fn texts(&self) -> Vec<String> {
            self.spoken.lock().iter().map(|(u, _)| u.text.clone()).collect()
        }
    }

    impl Synthesizer for FakeSynth {
        fn voices(&self) -> Vec<Voice> {
            self.voices.lock().clone()
        }

        fn speak(&self, utterance: Utterance, sink: SynthesisSink) -> Result<()> {
            if self.fail_speak {
                return Err(ConciergeError::Synthesis("device busy".to_string()));
            }
            self.spoken.lock().push((utterance, sink));
            Ok(())
        }

        fn cancel(&self) {
            *self.cancels.lock() += 1;
        }
    }

    fn ending(tx: UnboundedSender<SpeechOutcome>) -> SpeakCallbacks {
        SpeakCallbacks::new().on_end(move |outcome| {
            let _ = tx.send(outcome);
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_sentences_are_queued_one_at_a_time() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak("Hello there. How can I help?", ending(tx));
        assert_eq!(synth.texts(), vec!["Hello there."]);
        assert!(controller.is_speaking());

        synth.last_sink().emit(SynthesisEvent::Start);
        synth.last_sink().emit(SynthesisEvent::End);
        settle().await;
        assert_eq!(synth.texts(), vec!["Hello there.", "How can I help?"]);

        synth.last_sink().emit(SynthesisEvent::End);
        assert_eq!(rx.recv().await, Some(SpeechOutcome::Completed));
        assert!(!controller.is_speaking());
    }

    #[tokio::test]
    async fn test_utterance_carries_configured_voice_settings() {
        let synth = Arc::new(FakeSynth::default());
        let config = VocalizationConfig::default().with_lang("en-GB").with_rate(1.2);
        let controller = VocalizationController::new(synth.clone(), config);
        let (tx, _rx) = unbounded_channel();

        controller.speak("Mind the step.", ending(tx));
        let spoken = synth.spoken.lock();
        let (utterance, _) = spoken.last().unwrap();
        assert_eq!(utterance.lang, "en-GB");
        assert_eq!(utterance.rate, 1.2);
        assert!(utterance.voice.is_none());
    }

    #[tokio::test]
    async fn test_new_request_interrupts_previous() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (first_tx, mut first_rx) = unbounded_channel();
        let (second_tx, mut second_rx) = unbounded_channel();

        controller.speak("First answer.", ending(first_tx));
        let stale = synth.last_sink();
        controller.speak("Second answer.", ending(second_tx));

        assert_eq!(first_rx.recv().await, Some(SpeechOutcome::Interrupted));
        assert_eq!(*synth.cancels.lock(), 1);

        // The cancelled utterance reporting late must not end the new request
        stale.emit(SynthesisEvent::End);
        settle().await;
        assert!(controller.is_speaking());

        synth.last_sink().emit(SynthesisEvent::End);
        assert_eq!(second_rx.recv().await, Some(SpeechOutcome::Completed));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_ends_once() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak("Goodbye.", ending(tx));
        controller.stop();
        controller.stop();

        assert_eq!(rx.recv().await, Some(SpeechOutcome::Interrupted));
        assert!(rx.recv().await.is_none());
        assert!(!controller.is_speaking());
    }

    #[tokio::test]
    async fn test_error_advances_queue_and_reports_failure() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak("One. Two.", ending(tx));
        synth
            .last_sink()
            .emit(SynthesisEvent::Error("interrupted".to_string()));
        settle().await;
        assert_eq!(synth.texts(), vec!["One.", "Two."]);

        synth.last_sink().emit(SynthesisEvent::End);
        assert_eq!(
            rx.recv().await,
            Some(SpeechOutcome::Failed("interrupted".to_string()))
        );
    }

    #[tokio::test]
    async fn test_synchronous_failure_still_ends() {
        let synth = Arc::new(FakeSynth {
            fail_speak: true,
            ..Default::default()
        });
        let controller = VocalizationController::new(synth, VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak("Hello.", ending(tx));
        assert!(matches!(rx.recv().await, Some(SpeechOutcome::Failed(_))));
        assert!(!controller.is_speaking());
    }

    #[tokio::test]
    async fn test_empty_text_completes_immediately() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak("   ", ending(tx));
        assert_eq!(rx.recv().await, Some(SpeechOutcome::Completed));
        assert!(synth.texts().is_empty());
    }

    #[tokio::test]
    async fn test_start_callback_fires_once() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());
        let (tx, mut rx) = unbounded_channel();

        controller.speak(
            "One. Two.",
            SpeakCallbacks::new().on_start(move || {
                let _ = tx.send(());
            }),
        );
        synth.last_sink().emit(SynthesisEvent::Start);
        synth.last_sink().emit(SynthesisEvent::End);
        settle().await;
        synth.last_sink().emit(SynthesisEvent::Start);
        settle().await;

        assert_eq!(rx.recv().await, Some(()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prime_voices_waits_for_late_voices() {
        let synth = Arc::new(FakeSynth::default());
        let controller = VocalizationController::new(synth.clone(), VocalizationConfig::default());

        let loader = synth.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            *loader.voices.lock() = vec![
                Voice::new("Daniel", "en-GB"),
                Voice::new("Samantha", "en-US"),
            ];
        });

        let voice = controller.prime_voices().await;
        assert_eq!(voice.map(|v| v.name), Some("Samantha".to_string()));
        assert_eq!(controller.voice().map(|v| v.name), Some("Samantha".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prime_voices_gives_up() {
        let synth = Arc::new(FakeSynth::default());
        let config = VocalizationConfig {
            voice_poll_attempts: 3,
            ..Default::default()
        };
        let controller = VocalizationController::new(synth, config);
        assert!(controller.prime_voices().await.is_none());
    }
}
