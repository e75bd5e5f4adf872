//! Configuration for the kiosk
//!
//! Provides centralized configuration for all components, loadable from TOML.
//! Every field has a default, so a config file only needs the values it changes.

use crate::avatar::AvatarConfig;
use crate::llm::prompts::WELCOME_LINES;
use crate::llm::AnswerConfig;
use crate::speech::{RecognitionConfig, VocalizationConfig};
use crate::{ConciergeError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// What to do when the answer generator fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFailureMode {
    /// Speak and show an apology
    #[default]
    Apologize,
    /// Only update the status indicator
    Silent,
}

/// Conversation flow tuning
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub welcome_lines: Vec<String>,

    /// Start listening after the kiosk finishes speaking
    pub auto_listen: bool,

    /// Pause between speech ending and listening again
    pub resume_delay_ms: u64,

    /// Estimated speaking time per word, for the avatar backup timer
    pub per_word_ms: u64,

    /// Lower bound for the estimated speaking time
    pub min_speaking_ms: u64,

    /// Extra time past the estimate before speech is forcibly stopped
    pub speech_watchdog_grace_ms: u64,

    /// Recognition failures before manual text input is offered
    pub manual_input_threshold: u32,

    pub answer_failure_mode: AnswerFailureMode,

    /// Put recognition failures in the transcript instead of only the status line
    pub announce_recognition_failures: bool,

    /// Failures in a row before one is announced
    pub announce_after_failures: u32,

    /// How long the start-up microphone check may take
    pub permission_timeout_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            welcome_lines: WELCOME_LINES.iter().map(|l| l.to_string()).collect(),
            auto_listen: true,
            resume_delay_ms: 600,
            per_word_ms: 350,
            min_speaking_ms: 3000,
            speech_watchdog_grace_ms: 4000,
            manual_input_threshold: 2,
            answer_failure_mode: AnswerFailureMode::Apologize,
            announce_recognition_failures: false,
            announce_after_failures: 2,
            permission_timeout_ms: 3000,
        }
    }
}

/// Configuration for the complete kiosk
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub recognition: RecognitionConfig,
    pub vocalization: VocalizationConfig,
    pub avatar: AvatarConfig,
    pub answer: AnswerConfig,
    pub conversation: ConversationConfig,
}

impl KioskConfig {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConciergeError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| ConciergeError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KioskConfig =
            toml::from_str(content).map_err(|e| ConciergeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Where to look for a config file when none is given explicitly
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONCIERGE_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("concierge").join("kiosk.toml"))
    }

    pub fn with_auto_listen(mut self, auto_listen: bool) -> Self {
        self.conversation.auto_listen = auto_listen;
        self
    }

    pub fn with_manual_input_threshold(mut self, threshold: u32) -> Self {
        self.conversation.manual_input_threshold = threshold;
        self
    }

    pub fn with_answer_failure_mode(mut self, mode: AnswerFailureMode) -> Self {
        self.conversation.answer_failure_mode = mode;
        self
    }

    pub fn with_welcome_lines(mut self, lines: Vec<String>) -> Self {
        self.conversation.welcome_lines = lines;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.conversation.welcome_lines.iter().all(|l| l.trim().is_empty()) {
            return Err(ConciergeError::ConfigError(
                "at least one welcome line is required".to_string(),
            ));
        }
        if self.conversation.manual_input_threshold == 0 {
            return Err(ConciergeError::ConfigError(
                "manual_input_threshold must be at least 1".to_string(),
            ));
        }
        if self.recognition.start_timeout_ms == 0 {
            return Err(ConciergeError::ConfigError(
                "recognition.start_timeout_ms must be positive".to_string(),
            ));
        }
        if self.answer.timeout_ms == 0 {
            return Err(ConciergeError::ConfigError(
                "answer.timeout_ms must be positive".to_string(),
            ));
        }
        if !(self.answer.endpoint.starts_with("http://")
            || self.answer.endpoint.starts_with("https://"))
        {
            return Err(ConciergeError::ConfigError(format!(
                "answer.endpoint is not an HTTP URL: {}",
                self.answer.endpoint
            )));
        }
        Ok(())
    }
}
