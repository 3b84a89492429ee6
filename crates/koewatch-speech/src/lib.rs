//! Speech pipeline for koewatch: a priority-aware queue, a pluggable
//! synthesis sink, and the worker that drains one into the other.

mod queue;
mod sink;
mod worker;

pub use queue::{MetricsSnapshot, Priority, QueueMetrics, SpeechItem, SpeechQueue};
pub use sink::{SpeechSink, VoiceParams, VoicevoxSink};
pub use worker::run_speech_worker;
