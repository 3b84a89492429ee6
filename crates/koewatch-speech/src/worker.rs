//! The single consumer of the speech queue: dequeue, apply the skip rule,
//! synthesize and play. Sink failures are counted and logged; they never
//! poison the queue.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::queue::SpeechQueue;
use crate::sink::SpeechSink;

pub async fn run_speech_worker(
    queue: Arc<SpeechQueue>,
    sink: Arc<dyn SpeechSink>,
    cancel: CancellationToken,
) {
    while let Some(item) = queue.dequeue(&cancel).await {
        if queue.should_skip(&item) {
            queue.metrics().mark_skipped();
            tracing::debug!(id = item.id, text = %item.text, "skipped by higher-priority speech");
            continue;
        }

        match sink.synthesize(&item.text).await {
            Ok(audio) => match sink.play(&audio).await {
                Ok(()) => queue.metrics().mark_played(),
                Err(err) => {
                    queue.metrics().mark_error();
                    tracing::warn!(error = %err, "audio playback failed");
                }
            },
            Err(err) => {
                queue.metrics().mark_error();
                tracing::warn!(error = %err, "speech synthesis failed");
            }
        }
    }

    let snapshot = queue.metrics().snapshot();
    tracing::info!(
        queued = snapshot.queued,
        skipped = snapshot.skipped,
        played = snapshot.played,
        errors = snapshot.errors,
        uptime_secs = snapshot.uptime.as_secs(),
        "speech worker drained"
    );
}
