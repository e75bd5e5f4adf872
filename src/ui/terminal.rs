//! Terminal front end
//!
//! Runs the kiosk in a terminal with simulated devices: lines starting with
//! `>` are "spoken" into a simulated recognition engine, other lines are typed
//! input, and the synthesizer prints what it says, paced by word count.

use crate::avatar::{AvatarRenderer, Visual};
use crate::capability::{Environment, MediaApi};
use crate::integration::{KioskDevices, OrchestratorHandle};
use crate::llm::AnswerGenerator;
use crate::messages::Speaker;
use crate::speech::stt::{EngineEvent, EngineEventSink, RecognitionConfig};
use crate::speech::tts::{SynthesisEvent, SynthesisSink, Utterance};
use crate::speech::{RecognitionEngine, RecognitionEngineFactory, Synthesizer, Voice};
use crate::ui::state::KioskEvent;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

const HELP: &str = "\
Commands:
  /welcome   greet a new visitor
  /reset     end the conversation
  /mic       toggle the microphone (submits typed draft in manual mode)
  /quit      exit
  > text     say something into the microphone
  text       type a question";

/// A terminal always counts as a secure local context
pub struct TerminalEnvironment;

#[async_trait]
impl Environment for TerminalEnvironment {
    fn is_secure_context(&self) -> bool {
        true
    }

    fn protocol(&self) -> String {
        "app:".to_string()
    }

    fn hostname(&self) -> String {
        "localhost".to_string()
    }

    fn has_recognition_engine(&self) -> bool {
        true
    }

    fn media_api(&self) -> MediaApi {
        MediaApi::Standard
    }

    async fn request_microphone(&self, _api: MediaApi) -> Result<bool> {
        Ok(true)
    }
}

/// The "microphone" the terminal speaks into; shared by every simulated engine
#[derive(Clone, Default)]
pub struct SimulatedMicrophone {
    active: Arc<Mutex<Option<EngineEventSink>>>,
}

impl SimulatedMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Deliver an utterance to the listening engine; false when nobody listens
    pub fn say(&self, text: &str) -> bool {
        let Some(sink) = self.active.lock().take() else {
            return false;
        };
        sink.emit(EngineEvent::SoundStart);
        sink.emit(EngineEvent::SpeechStart);
        sink.emit(EngineEvent::Result {
            transcript: text.to_string(),
            confidence: 0.95,
            is_final: true,
        });
        sink.emit(EngineEvent::SpeechEnd);
        sink.emit(EngineEvent::End);
        true
    }
}

impl RecognitionEngineFactory for SimulatedMicrophone {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, config: &RecognitionConfig) -> Result<Box<dyn RecognitionEngine>> {
        debug!("Creating simulated recognition engine ({})", config.locale);
        Ok(Box::new(SimulatedEngine {
            microphone: self.clone(),
        }))
    }
}

struct SimulatedEngine {
    microphone: SimulatedMicrophone,
}

impl SimulatedEngine {
    fn close(&mut self) {
        if let Some(sink) = self.microphone.active.lock().take() {
            sink.emit(EngineEvent::AudioEnd);
            sink.emit(EngineEvent::End);
        }
    }
}

impl RecognitionEngine for SimulatedEngine {
    fn start(&mut self, sink: EngineEventSink) -> Result<()> {
        sink.emit(EngineEvent::Start);
        sink.emit(EngineEvent::AudioStart);
        *self.microphone.active.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.close();
    }

    fn abort(&mut self) {
        self.close();
    }
}

/// Prints utterances and paces them by word count
pub struct TerminalSynthesizer {
    per_word: Duration,
    generation: Arc<AtomicU64>,
}

impl TerminalSynthesizer {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Synthesizer for TerminalSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        vec![
            Voice::new("Daniel", "en-GB").as_default(),
            Voice::new("Samantha", "en-US"),
        ]
    }

    fn speak(&self, utterance: Utterance, sink: SynthesisSink) -> Result<()> {
        let generation = Arc::clone(&self.generation);
        let issued = generation.load(Ordering::SeqCst);
        let words = utterance.text.split_whitespace().count() as u32;
        let duration = self.per_word * words.max(1);

        tokio::spawn(async move {
            // A cancelled utterance never reports its end
            sink.emit(SynthesisEvent::Start);
            println!("  (speaking) {}", utterance.text);
            tokio::time::sleep(duration).await;
            if generation.load(Ordering::SeqCst) == issued {
                sink.emit(SynthesisEvent::End);
            }
        });
        Ok(())
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Logs visual switches instead of drawing them
pub struct TerminalAvatar;

#[async_trait]
impl AvatarRenderer for TerminalAvatar {
    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self, visual: Visual, asset: &str) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        debug!("Avatar showing {} ({})", visual, asset);
        Ok(())
    }

    fn show_fallback(&self, image: &str) {
        info!("Avatar showing static image {}", image);
    }
}

/// Wire up simulated devices around a real answer generator
pub fn terminal_devices(answers: Arc<dyn AnswerGenerator>) -> (KioskDevices, SimulatedMicrophone) {
    let microphone = SimulatedMicrophone::new();
    let devices = KioskDevices {
        environment: Arc::new(TerminalEnvironment),
        recognition: Arc::new(microphone.clone()),
        synthesizer: Arc::new(TerminalSynthesizer::new(Duration::from_millis(120))),
        avatar: Arc::new(TerminalAvatar),
        answers,
    };
    (devices, microphone)
}

fn print_event(event: &KioskEvent) {
    match event {
        KioskEvent::MessageAdded(message) => {
            let who = match message.speaker {
                Speaker::Visitor => "Visitor",
                Speaker::Assistant => "Concierge",
                Speaker::System => "--",
            };
            println!("{}: {}", who, message.text);
        }
        KioskEvent::StatusChanged(status) => println!("  [{}]", status.label()),
        KioskEvent::Notice(notice) => println!("  ({})", notice),
        KioskEvent::ManualInputEngaged => {
            println!("  Manual input is on: type your question and press enter")
        }
        KioskEvent::PermissionPrompt(true) => println!("  Please allow microphone access"),
        KioskEvent::SessionReset => println!("  --- conversation reset ---"),
        _ => {}
    }
}

/// Read commands from stdin until `/quit` or end of input
pub async fn run(handle: OrchestratorHandle, microphone: SimulatedMicrophone) -> Result<()> {
    let events = handle.event_receiver();
    let printer = thread::spawn(move || {
        while let Ok(event) = events.recv() {
            print_event(&event);
            if event == KioskEvent::Shutdown {
                break;
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/welcome" => handle.trigger_welcome()?,
            "/reset" => handle.reset()?,
            "/mic" => handle.toggle_microphone()?,
            "/help" => println!("{}", HELP),
            "/quit" => break,
            spoken if spoken.starts_with('>') => {
                let spoken = spoken.trim_start_matches('>').trim();
                if !microphone.say(spoken) {
                    println!("  (not listening; try /mic or /welcome)");
                }
            }
            typed => handle.submit_text(typed)?,
        }
    }

    handle.shutdown()?;
    if printer.join().is_err() {
        debug!("Event printer panicked");
    }
    Ok(())
}
