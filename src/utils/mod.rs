pub mod channels;
pub mod perf;

pub use channels::SignalBus;
pub use perf::{LatencyTracker, TurnMetrics, TurnTimer};
