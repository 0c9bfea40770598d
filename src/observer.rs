//! Metrics observer injected into the call pipeline.
//!
//! Components report events through [`CallObserver`]; nothing reaches for a
//! global registry. [`CallMetrics`] counts them, [`LogObserver`] traces them.

use crate::protocol::ChannelId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver of pipeline events. Every method defaults to a no-op.
pub trait CallObserver: Send + Sync {
    fn pipeline_created(&self, _channel: &ChannelId) {}
    fn pipeline_evicted(&self, _channel: &ChannelId) {}
    fn terminator_timeout(&self, _channel: &ChannelId) {}
    fn header_frame(&self) {}
    fn terminator_frame(&self) {}
    fn voice_frame(&self, _encrypted: bool) {}
    fn decode_failed(&self) {}
    fn chunk_dropped(&self) {}
    fn artifact_queued(&self, _bytes: usize) {}
    fn upload_succeeded(&self) {}
    fn upload_failed(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Observer that emits a trace event per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl CallObserver for LogObserver {
    fn pipeline_created(&self, channel: &ChannelId) {
        tracing::trace!(%channel, "metric: pipeline_created");
    }

    fn pipeline_evicted(&self, channel: &ChannelId) {
        tracing::trace!(%channel, "metric: pipeline_evicted");
    }

    fn terminator_timeout(&self, channel: &ChannelId) {
        tracing::trace!(%channel, "metric: terminator_timeout");
    }

    fn voice_frame(&self, encrypted: bool) {
        tracing::trace!(encrypted, "metric: voice_frame");
    }

    fn artifact_queued(&self, bytes: usize) {
        tracing::trace!(bytes, "metric: artifact_queued");
    }

    fn upload_succeeded(&self) {
        tracing::trace!("metric: upload_succeeded");
    }

    fn upload_failed(&self) {
        tracing::trace!("metric: upload_failed");
    }
}

/// Point-in-time copy of [`CallMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pipelines_created: u64,
    pub pipelines_evicted: u64,
    pub terminator_timeouts: u64,
    pub header_frames: u64,
    pub terminator_frames: u64,
    pub clear_voice_frames: u64,
    pub encrypted_voice_frames: u64,
    pub decode_failures: u64,
    pub chunks_dropped: u64,
    pub artifacts_queued: u64,
    pub artifact_bytes: u64,
    pub last_artifact_bytes: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
}

/// Lock-free counters for every pipeline event.
#[derive(Debug, Default)]
pub struct CallMetrics {
    pipelines_created: AtomicU64,
    pipelines_evicted: AtomicU64,
    terminator_timeouts: AtomicU64,
    header_frames: AtomicU64,
    terminator_frames: AtomicU64,
    clear_voice_frames: AtomicU64,
    encrypted_voice_frames: AtomicU64,
    decode_failures: AtomicU64,
    chunks_dropped: AtomicU64,
    artifacts_queued: AtomicU64,
    artifact_bytes: AtomicU64,
    last_artifact_bytes: AtomicU64,
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
}

impl CallMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            pipelines_created: get(&self.pipelines_created),
            pipelines_evicted: get(&self.pipelines_evicted),
            terminator_timeouts: get(&self.terminator_timeouts),
            header_frames: get(&self.header_frames),
            terminator_frames: get(&self.terminator_frames),
            clear_voice_frames: get(&self.clear_voice_frames),
            encrypted_voice_frames: get(&self.encrypted_voice_frames),
            decode_failures: get(&self.decode_failures),
            chunks_dropped: get(&self.chunks_dropped),
            artifacts_queued: get(&self.artifacts_queued),
            artifact_bytes: get(&self.artifact_bytes),
            last_artifact_bytes: get(&self.last_artifact_bytes),
            uploads_succeeded: get(&self.uploads_succeeded),
            uploads_failed: get(&self.uploads_failed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl CallObserver for CallMetrics {
    fn pipeline_created(&self, _channel: &ChannelId) {
        Self::inc(&self.pipelines_created);
    }

    fn pipeline_evicted(&self, _channel: &ChannelId) {
        Self::inc(&self.pipelines_evicted);
    }

    fn terminator_timeout(&self, _channel: &ChannelId) {
        Self::inc(&self.terminator_timeouts);
    }

    fn header_frame(&self) {
        Self::inc(&self.header_frames);
    }

    fn terminator_frame(&self) {
        Self::inc(&self.terminator_frames);
    }

    fn voice_frame(&self, encrypted: bool) {
        if encrypted {
            Self::inc(&self.encrypted_voice_frames);
        } else {
            Self::inc(&self.clear_voice_frames);
        }
    }

    fn decode_failed(&self) {
        Self::inc(&self.decode_failures);
    }

    fn chunk_dropped(&self) {
        Self::inc(&self.chunks_dropped);
    }

    fn artifact_queued(&self, bytes: usize) {
        Self::inc(&self.artifacts_queued);
        self.artifact_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.last_artifact_bytes
            .store(bytes as u64, Ordering::Relaxed);
    }

    fn upload_succeeded(&self) {
        Self::inc(&self.uploads_succeeded);
    }

    fn upload_failed(&self) {
        Self::inc(&self.uploads_failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_count_events() {
        let metrics = CallMetrics::new();
        let channel = ChannelId::direct(1, 2, 3, 4, 5);

        metrics.pipeline_created(&channel);
        metrics.voice_frame(true);
        metrics.voice_frame(false);
        metrics.voice_frame(false);
        metrics.artifact_queued(100);
        metrics.artifact_queued(60);
        metrics.upload_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pipelines_created, 1);
        assert_eq!(snapshot.encrypted_voice_frames, 1);
        assert_eq!(snapshot.clear_voice_frames, 2);
        assert_eq!(snapshot.artifacts_queued, 2);
        assert_eq!(snapshot.artifact_bytes, 160);
        assert_eq!(snapshot.last_artifact_bytes, 60);
        assert_eq!(snapshot.uploads_failed, 1);
        assert_eq!(snapshot.uploads_succeeded, 0);
    }

    #[test]
    fn test_log_observer_does_not_panic() {
        let observer = LogObserver;
        observer.pipeline_evicted(&ChannelId::group(1, 2, 3, 4, 5, 6.0));
        observer.artifact_queued(10);
    }
}
