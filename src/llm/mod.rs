//! Remote answer generation
//!
//! This module provides:
//! - An HTTP client for an OpenAI-compatible chat completions endpoint
//! - The persona, prompt composition and canned kiosk lines

pub mod client;
pub mod prompts;

pub use client::{AnswerConfig, AnswerGenerator, HttpAnswerClient};
pub use prompts::compose_prompt;
