//! Kiosk view state
//!
//! The orchestrator is the only writer. Front ends either read a snapshot of
//! the shared [`KioskView`] or follow the [`KioskEvent`] stream.

use crate::messages::{Message, TranscriptLog};
use parking_lot::RwLock;
use std::sync::Arc;

/// What the status indicator shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KioskStatus {
    #[default]
    Idle,
    Listening,
    /// The engine reports sound or speech
    Hearing,
    Thinking,
    Speaking,
    ManualInput,
    /// Voice input cannot work here
    Unavailable(String),
}

impl KioskStatus {
    pub fn label(&self) -> String {
        match self {
            KioskStatus::Idle => "Ready".to_string(),
            KioskStatus::Listening => "Listening...".to_string(),
            KioskStatus::Hearing => "Hearing you...".to_string(),
            KioskStatus::Thinking => "Thinking...".to_string(),
            KioskStatus::Speaking => "Speaking".to_string(),
            KioskStatus::ManualInput => "Type your question".to_string(),
            KioskStatus::Unavailable(reason) => format!("Voice unavailable: {}", reason),
        }
    }
}

/// Events published to front ends
#[derive(Debug, Clone, PartialEq)]
pub enum KioskEvent {
    StatusChanged(KioskStatus),
    MessageAdded(Message),
    /// Latest partial transcript while the visitor is still talking
    Interim(String),
    Notice(String),
    NoticeCleared,
    ThinkingChanged(bool),
    ManualInputEngaged,
    /// Whether to show the "allow microphone" affordance
    PermissionPrompt(bool),
    SessionReset,
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct KioskView {
    pub status: KioskStatus,
    pub transcript: TranscriptLog,
    pub interim: Option<String>,
    /// Transient notice such as "please wait"
    pub notice: Option<String>,
    pub thinking: bool,
    pub manual_input_visible: bool,
    /// Text typed into the manual input control
    pub draft: String,
    pub permission_prompt: bool,
    pub listening: bool,
}

impl KioskView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.transcript.get_all()
    }

    /// Clear everything shown for the session
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.status = KioskStatus::Idle;
        self.interim = None;
        self.notice = None;
        self.thinking = false;
        self.manual_input_visible = false;
        self.draft.clear();
        self.listening = false;
    }
}

pub type SharedKioskView = Arc<RwLock<KioskView>>;

pub fn shared_view() -> SharedKioskView {
    Arc::new(RwLock::new(KioskView::new()))
}
