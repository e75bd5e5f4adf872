//! Conversation session bookkeeping

/// Where the conversation loop is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    WelcomePlaying,
    Listening,
    Processing,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "idle"),
            ConversationState::WelcomePlaying => write!(f, "welcome"),
            ConversationState::Listening => write!(f, "listening"),
            ConversationState::Processing => write!(f, "processing"),
        }
    }
}

/// One visitor conversation, from welcome to reset
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationSession {
    pub active: bool,
    /// True between accepting a transcript and dispatching its spoken answer
    pub processing: bool,
    pub failure_count: u32,
    pub manual_input_engaged: bool,
    pub state: ConversationState,
    /// Increases with every accepted transcript
    pub turn: u64,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session; counters carry over unless the session was reset
    pub fn begin(&mut self) {
        self.active = true;
        self.state = ConversationState::WelcomePlaying;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Take a transcript into processing; false if one is already in flight
    pub fn accept_transcript(&mut self) -> bool {
        if self.processing {
            return false;
        }
        self.processing = true;
        self.active = true;
        self.failure_count = 0;
        self.turn += 1;
        self.state = ConversationState::Processing;
        true
    }

    /// The answer for the current turn has been handed to vocalization
    pub fn answer_dispatched(&mut self) {
        self.processing = false;
        self.state = ConversationState::Listening;
    }

    /// Count a recognition failure; true exactly once, when manual input should engage
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.failure_count += 1;
        if !self.manual_input_engaged && self.failure_count >= threshold {
            self.manual_input_engaged = true;
            return true;
        }
        false
    }

    /// Engage manual input right away; true if it was not engaged yet
    pub fn engage_manual_input(&mut self) -> bool {
        !std::mem::replace(&mut self.manual_input_engaged, true)
    }
}
