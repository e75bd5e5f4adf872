//! Per-turn latency tracking
//!
//! Measures how long the remote answer generator and the spoken reply take,
//! so slow endpoints show up in the logs.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks answer latencies over a sliding window
#[derive(Debug)]
pub struct LatencyTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Timer for one visitor turn, from accepted transcript to finished reply
#[derive(Debug)]
pub struct TurnTimer {
    start: Instant,
    answered: Option<Duration>,
}

impl TurnTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            answered: None,
        }
    }

    /// Mark the moment the answer (or failure) came back
    pub fn mark_answered(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        self.answered = Some(elapsed);
        elapsed
    }

    /// Close the turn once the reply has been spoken
    pub fn finish(self) -> TurnMetrics {
        let total = self.start.elapsed();
        let answer = self.answered.unwrap_or(total);
        TurnMetrics {
            answer_ms: answer.as_millis() as u64,
            speech_ms: total.saturating_sub(answer).as_millis() as u64,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TurnMetrics {
    /// Time waiting on the answer generator
    pub answer_ms: u64,
    /// Time spent speaking the reply
    pub speech_ms: u64,
}

impl TurnMetrics {
    pub fn total_ms(&self) -> u64 {
        self.answer_ms + self.speech_ms
    }

    pub fn summary(&self) -> String {
        format!(
            "answer: {}ms | speech: {}ms | total: {}ms",
            self.answer_ms,
            self.speech_ms,
            self.total_ms()
        )
    }
}
