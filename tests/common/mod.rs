//! Scripted in-memory devices shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use concierge::avatar::{AvatarRenderer, Visual};
use concierge::capability::{Environment, MediaApi};
use concierge::integration::{KioskConfig, KioskDevices, Orchestrator, OrchestratorHandle};
use concierge::llm::prompts::STILL_PROCESSING;
use concierge::llm::AnswerGenerator;
use concierge::messages::{Message, Speaker};
use concierge::speech::stt::{EngineEvent, EngineEventSink, RecognitionConfig};
use concierge::speech::tts::{SynthesisEvent, SynthesisSink, Utterance};
use concierge::speech::{RecognitionEngine, RecognitionEngineFactory, Synthesizer, Voice};
use concierge::ui::state::KioskEvent;
use concierge::{ConciergeError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct ScriptedEnvironment {
    pub secure: bool,
    pub hostname: String,
    pub recognition: bool,
    pub api: MediaApi,
    pub permission: Result<bool>,
}

impl Default for ScriptedEnvironment {
    fn default() -> Self {
        Self {
            secure: true,
            hostname: "localhost".to_string(),
            recognition: true,
            api: MediaApi::Standard,
            permission: Ok(true),
        }
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    fn is_secure_context(&self) -> bool {
        self.secure
    }

    fn protocol(&self) -> String {
        if self.secure { "https:" } else { "http:" }.to_string()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn has_recognition_engine(&self) -> bool {
        self.recognition
    }

    fn media_api(&self) -> MediaApi {
        self.api
    }

    async fn request_microphone(&self, _api: MediaApi) -> Result<bool> {
        self.permission.clone()
    }
}

/// Recognition engine factory whose engines are driven by the test
pub struct ScriptedRecognition {
    pub supported: bool,
    /// Engines report started as soon as they are started
    pub auto_start: bool,
    pub fail_start: bool,
    pub sinks: Mutex<Vec<EngineEventSink>>,
    pub stops: Mutex<usize>,
}

impl Default for ScriptedRecognition {
    fn default() -> Self {
        Self {
            supported: true,
            auto_start: true,
            fail_start: false,
            sinks: Mutex::new(Vec::new()),
            stops: Mutex::new(0),
        }
    }
}

impl ScriptedRecognition {
    pub fn silent() -> Self {
        Self {
            auto_start: false,
            ..Default::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock()
    }

    /// Sink of the most recently started engine
    pub fn latest(&self) -> EngineEventSink {
        self.sinks
            .lock()
            .last()
            .cloned()
            .expect("no engine has been started")
    }

    pub fn emit(&self, event: EngineEvent) {
        self.latest().emit(event);
    }

    pub fn say(&self, text: &str) {
        self.emit(EngineEvent::Result {
            transcript: text.to_string(),
            confidence: 0.9,
            is_final: true,
        });
    }

    pub fn fail(&self, kind: &str) {
        self.emit(EngineEvent::Error(kind.to_string()));
    }
}

struct ScriptedEngine {
    factory: Arc<ScriptedRecognition>,
}

impl RecognitionEngine for ScriptedEngine {
    fn start(&mut self, sink: EngineEventSink) -> Result<()> {
        if self.factory.fail_start {
            return Err(ConciergeError::StartError("already started".to_string()));
        }
        if self.factory.auto_start {
            sink.emit(EngineEvent::Start);
        }
        self.factory.sinks.lock().push(sink);
        Ok(())
    }

    fn stop(&mut self) {
        *self.factory.stops.lock() += 1;
    }

    fn abort(&mut self) {
        *self.factory.stops.lock() += 1;
    }
}

/// `RecognitionEngineFactory` needs an owner for engines to report back to
pub struct ScriptedRecognitionFactory(pub Arc<ScriptedRecognition>);

impl RecognitionEngineFactory for ScriptedRecognitionFactory {
    fn is_supported(&self) -> bool {
        self.0.supported
    }

    fn create(&self, _config: &RecognitionConfig) -> Result<Box<dyn RecognitionEngine>> {
        Ok(Box::new(ScriptedEngine {
            factory: Arc::clone(&self.0),
        }))
    }
}

/// Synthesizer that records utterances; optionally finishes them by itself
pub struct ScriptedSynth {
    pub auto_complete: bool,
    pub utterance_ms: u64,
    spoken: Mutex<Vec<(String, SynthesisSink)>>,
    cancels: Mutex<usize>,
}

impl Default for ScriptedSynth {
    fn default() -> Self {
        Self {
            auto_complete: true,
            utterance_ms: 100,
            spoken: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
        }
    }
}

impl ScriptedSynth {
    /// Never reports start or end
    pub fn mute() -> Self {
        Self {
            auto_complete: false,
            ..Default::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn cancel_count(&self) -> usize {
        *self.cancels.lock()
    }
}

impl Synthesizer for ScriptedSynth {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Samantha", "en-US")]
    }

    fn speak(&self, utterance: Utterance, sink: SynthesisSink) -> Result<()> {
        self.spoken.lock().push((utterance.text, sink.clone()));
        if self.auto_complete {
            let delay = Duration::from_millis(self.utterance_ms);
            tokio::spawn(async move {
                sink.emit(SynthesisEvent::Start);
                tokio::time::sleep(delay).await;
                sink.emit(SynthesisEvent::End);
            });
        }
        Ok(())
    }

    fn cancel(&self) {
        *self.cancels.lock() += 1;
    }
}

#[derive(Default)]
pub struct CountingAvatar {
    loads: Mutex<Vec<Visual>>,
}

impl CountingAvatar {
    pub fn loads(&self) -> Vec<Visual> {
        self.loads.lock().clone()
    }

    pub fn current(&self) -> Option<Visual> {
        self.loads.lock().last().copied()
    }
}

#[async_trait]
impl AvatarRenderer for CountingAvatar {
    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self, visual: Visual, _asset: &str) -> Result<()> {
        self.loads.lock().push(visual);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    fn show_fallback(&self, _image: &str) {}
}

/// Answer generator returning queued responses after a delay.
///
/// Like the HTTP client, it answers a request made while another is still
/// running with the "still processing" stand-in.
pub struct ScriptedAnswers {
    pub delay: Duration,
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicBool,
}

struct Busy<'a>(&'a AtomicBool);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScriptedAnswers {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            delay: Duration::from_millis(200),
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedAnswers {
    async fn answer(&self, utterance: &str) -> Result<String> {
        self.calls.lock().push(utterance.to_string());
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(STILL_PROCESSING.to_string());
        }
        let _busy = Busy(&self.in_flight);
        tokio::time::sleep(self.delay).await;
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| Ok("Happy to help.".to_string()))
    }
}

/// A running kiosk plus handles on all of its scripted devices
pub struct Rig {
    pub handle: OrchestratorHandle,
    pub recognition: Arc<ScriptedRecognition>,
    pub synth: Arc<ScriptedSynth>,
    pub avatar: Arc<CountingAvatar>,
    pub answers: Arc<ScriptedAnswers>,
}

impl Rig {
    pub fn start(config: KioskConfig, synth: ScriptedSynth, answers: ScriptedAnswers) -> Self {
        Self::start_with(
            config,
            ScriptedEnvironment::default(),
            ScriptedRecognition::default(),
            synth,
            answers,
        )
    }

    pub fn start_with(
        config: KioskConfig,
        environment: ScriptedEnvironment,
        recognition: ScriptedRecognition,
        synth: ScriptedSynth,
        answers: ScriptedAnswers,
    ) -> Self {
        let recognition = Arc::new(recognition);
        let synth = Arc::new(synth);
        let avatar = Arc::new(CountingAvatar::default());
        let answers = Arc::new(answers);

        let devices = KioskDevices {
            environment: Arc::new(environment),
            recognition: Arc::new(ScriptedRecognitionFactory(Arc::clone(&recognition))),
            synthesizer: synth.clone(),
            avatar: avatar.clone(),
            answers: answers.clone(),
        };
        let (orchestrator, handle) = Orchestrator::new(config, devices);
        orchestrator.start();

        Self {
            handle,
            recognition,
            synth,
            avatar,
            answers,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.handle.view().read().messages()
    }

    pub fn texts_from(&self, speaker: Speaker) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.speaker == speaker)
            .map(|m| m.text)
            .collect()
    }

    pub fn is_listening(&self) -> bool {
        self.handle.view().read().listening
    }

    pub fn notice(&self) -> Option<String> {
        self.handle.view().read().notice.clone()
    }

    pub fn manual_input_visible(&self) -> bool {
        self.handle.view().read().manual_input_visible
    }

    pub fn drain_events(&self) -> Vec<KioskEvent> {
        std::iter::from_fn(|| self.handle.try_recv_event()).collect()
    }
}

/// Config with a single, predictable welcome line
pub fn test_config() -> KioskConfig {
    KioskConfig::default().with_welcome_lines(vec!["Welcome!".to_string()])
}

/// Let spawned tasks run for `ms` of (virtual) time
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Poll `condition` every 10ms of virtual time, up to `limit_ms`
pub async fn wait_until(limit_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let mut waited = 0;
    while waited <= limit_ms {
        if condition() {
            return true;
        }
        advance(10).await;
        waited += 10;
    }
    false
}
