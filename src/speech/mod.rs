//! Speech input and output controllers
//!
//! This module provides:
//! - Recognition session control over a single-shot recognition engine
//! - Vocalization through a platform synthesizer, sentence by sentence
//! - Sentence chunking and voice selection helpers

pub mod chunker;
pub mod stt;
pub mod tts;

// Re-export commonly used types
pub use chunker::{estimate_speaking_ms, select_voice, split_sentences, TextChunk, Voice};
pub use stt::{
    EngineActivity, EngineEvent, EngineEventSink, ErrorKind, RecognitionConfig,
    RecognitionController, RecognitionEngine, RecognitionEngineFactory, RecognitionSignal,
    RecognitionState,
};
pub use tts::{
    SpeakCallbacks, SpeechOutcome, SynthesisEvent, SynthesisSink, Synthesizer, Utterance,
    VocalizationConfig, VocalizationController,
};
