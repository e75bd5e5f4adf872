use super::types::{Message, Speaker};
use parking_lot::RwLock;
use std::sync::Arc;

/// The conversation transcript shown on screen
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    messages: Arc<RwLock<Vec<Message>>>,
    capacity: usize,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::with_capacity(200)
    }

    /// Keep at most `capacity` messages, dropping the oldest first
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&self, message: Message) {
        let mut messages = self.messages.write();
        messages.push(message);
        if messages.len() > self.capacity {
            let excess = messages.len() - self.capacity;
            messages.drain(..excess);
        }
    }

    pub fn get_all(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn last_from(&self, speaker: Speaker) -> Option<Message> {
        self.messages
            .read()
            .iter()
            .rev()
            .find(|m| m.speaker == speaker)
            .cloned()
    }

    pub fn count_from(&self, speaker: Speaker) -> usize {
        self.messages
            .read()
            .iter()
            .filter(|m| m.speaker == speaker)
            .count()
    }

    pub fn clear(&self) {
        self.messages.write().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}
