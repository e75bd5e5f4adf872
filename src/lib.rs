//! Concierge - a kiosk-style voice front end
//!
//! A staff member triggers a spoken welcome, a visitor speaks or types a
//! question, the answer comes back from a hosted LLM endpoint and is spoken
//! aloud while an avatar animates. The interesting part is the
//! [`integration::Orchestrator`], which keeps speech recognition, speech
//! synthesis, avatar animation and the remote call in one self-healing loop.

pub mod avatar;
pub mod capability;
pub mod integration;
pub mod llm;
pub mod messages;
pub mod speech;
pub mod ui;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConciergeError {
    #[error("Speech recognition is not supported in this environment")]
    NotSupported,

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Recognition start error: {0}")]
    StartError(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Avatar load error: {0}")]
    AvatarLoad(String),

    #[error("Answer generator error: {0}")]
    AnswerGenerator(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for ConciergeError {
    fn from(e: std::io::Error) -> Self {
        ConciergeError::IOError(e.to_string())
    }
}

impl ConciergeError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Capability and permission problems need a person to fix them
            ConciergeError::NotSupported => false,
            ConciergeError::PermissionDenied => false,
            // These are typically transient errors
            ConciergeError::StartError(_) => true,
            ConciergeError::Recognition(_) => true,
            ConciergeError::Synthesis(_) => true,
            ConciergeError::AvatarLoad(_) => true,
            ConciergeError::AnswerGenerator(_) => true,
            ConciergeError::Timeout(_) => true,
            ConciergeError::ConfigError(_) => false,
            ConciergeError::ChannelError(_) => false,
            ConciergeError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ConciergeError::NotSupported => {
                "Voice input isn't available here. Please type your question.".to_string()
            }
            ConciergeError::PermissionDenied => {
                "Microphone access was denied. Please type your question or ask staff for help."
                    .to_string()
            }
            ConciergeError::StartError(_) => {
                "The microphone didn't start. Please try again.".to_string()
            }
            ConciergeError::Recognition(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            ConciergeError::Synthesis(_) => {
                "Speech output failed. The answer is shown as text.".to_string()
            }
            ConciergeError::AvatarLoad(_) => "Avatar animation is unavailable.".to_string(),
            ConciergeError::AnswerGenerator(_) => {
                "I couldn't get an answer just now. Please try again.".to_string()
            }
            ConciergeError::Timeout(_) => "That took too long. Please try again.".to_string(),
            ConciergeError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ConciergeError::ChannelError(_) => {
                "Internal communication error. Please reset the kiosk.".to_string()
            }
            ConciergeError::IOError(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConciergeError>;
