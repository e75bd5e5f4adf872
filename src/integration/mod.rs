//! Conversation loop wiring
//!
//! This module provides:
//! - The orchestrator state machine and its handle
//! - Kiosk configuration
//! - Conversation session bookkeeping

pub mod config;
pub mod orchestrator;
pub mod session;

pub use config::{AnswerFailureMode, ConversationConfig, KioskConfig};
pub use orchestrator::{KioskCommand, KioskDevices, Orchestrator, OrchestratorHandle};
pub use session::{ConversationSession, ConversationState};
