//! Stream-to-storage application entry point.
//!
//! Wires the frame source, the call manager and the blob store together:
//! read records → route frames → slice calls → upload WAV → advance position.

use crate::call::decoder::{PcmDecoder, VoiceDecoder};
use crate::call::manager::CallManager;
use crate::checkpoint::CheckpointTracker;
use crate::config::Config;
use crate::consumer::FrameConsumer;
use crate::error::{CallError, Result};
use crate::observer::{CallMetrics, MetricsSnapshot};
use crate::pipeline::{DecoderFactory, WavPipelineFactory};
use crate::source::{JsonLinesSource, SourceHandle};
use crate::storage::ObjectStoreBlobStore;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Lines read from the input.
    pub lines: u64,
    /// Durable stream position at exit.
    pub committed: Option<u64>,
    /// Uploads still in flight when the drain timed out.
    pub abandoned_uploads: usize,
    pub metrics: MetricsSnapshot,
}

/// Run the stream command: consume frames until end of input, then flush.
///
/// # Arguments
/// * `config` - Effective configuration (file + environment)
/// * `input` - Input file override from CLI; falls back to `source.path`, then stdin
/// * `drain_timeout` - How long to wait for in-flight uploads at shutdown
///
/// # Returns
/// A summary on clean end of input, or the error that stopped the consumer.
/// A corrupted traffic frame stops the run with [`CallError::CorruptFrame`].
pub async fn run_stream_command(
    config: Config,
    input: Option<PathBuf>,
    drain_timeout: Duration,
) -> Result<RunSummary> {
    config.validate()?;

    let metrics = Arc::new(CallMetrics::new());
    let store = Arc::new(ObjectStoreBlobStore::from_config(
        &config.storage,
        Handle::current(),
    )?);

    let decoder_factory: DecoderFactory = Arc::new(|| Box::new(PcmDecoder) as Box<dyn VoiceDecoder>);
    let factory = WavPipelineFactory::new(
        config.call.clone(),
        decoder_factory,
        store.clone(),
        config.storage.key_prefix.clone(),
    )
    .with_observer(metrics.clone());
    let manager = Arc::new(CallManager::new(Arc::new(factory)).with_observer(metrics.clone()));
    let sweeper = manager.spawn_sweeper(config.call.sweep_interval())?;

    let source = open_source(&config)?;
    let reader = open_input(input.or_else(|| config.source.path.clone()))?;
    let handle = source.spawn(reader, config.source.queue_size)?;
    let tracker = handle.tracker().clone();

    let consumer = FrameConsumer::new(manager.clone());
    let processed = tokio::task::spawn_blocking(move || consume_records(&consumer, handle))
        .await
        .map_err(|e| CallError::Other(format!("frame processing task failed: {e}")))?;

    sweeper.stop();
    let lines = match processed {
        Ok(lines) => {
            let closed = manager.finalize_all();
            tracing::info!(lines, closed, "end of input, open calls finalized");
            lines
        }
        Err(e) => {
            // Open calls keep their checkpoints; the stream redelivers them.
            tracing::error!(error = %e, open = manager.pipeline_count(), "stopping consumer");
            drain_uploads(&store, drain_timeout).await;
            return Err(e);
        }
    };

    let abandoned_uploads = drain_uploads(&store, drain_timeout).await;
    let summary = RunSummary {
        lines,
        committed: tracker.committed(),
        abandoned_uploads,
        metrics: metrics.snapshot(),
    };
    tracing::info!(
        lines = summary.lines,
        committed = ?summary.committed,
        held = tracker.held(),
        abandoned = summary.abandoned_uploads,
        uploads = summary.metrics.uploads_succeeded,
        failed = summary.metrics.uploads_failed,
        "run complete"
    );
    Ok(summary)
}

/// Render the effective configuration as TOML.
pub fn render_config(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| CallError::ConfigParse {
        message: e.to_string(),
    })
}

fn open_source(config: &Config) -> Result<JsonLinesSource> {
    let Some(path) = &config.source.checkpoint_path else {
        return Ok(JsonLinesSource::new().with_max_held(config.source.max_held));
    };
    let position = CheckpointTracker::restore(path)?;
    if let Some(position) = position {
        tracing::info!(position, path = %path.display(), "resuming after committed position");
    }
    Ok(JsonLinesSource::resuming_after(position)
        .with_persist_path(path)
        .with_max_held(config.source.max_held))
}

fn open_input(path: Option<PathBuf>) -> Result<Box<dyn BufRead + Send>> {
    match path {
        Some(path) => {
            let file = File::open(&path).map_err(|e| {
                CallError::Other(format!("cannot open input {}: {}", path.display(), e))
            })?;
            tracing::info!(path = %path.display(), "reading frame stream");
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            tracing::info!("reading frame stream from stdin");
            Ok(Box::new(BufReader::new(std::io::stdin())))
        }
    }
}

fn consume_records(consumer: &FrameConsumer, handle: SourceHandle) -> Result<u64> {
    let tracker = handle.tracker();
    handle.records().iter().try_for_each(|item| {
        consumer
            .process(item.record, item.checkpoint)
            .and_then(|()| tracker.check_backlog())
            .inspect_err(|e| {
                tracing::error!(line = item.sequence, error = %e, "fatal stream error");
            })
    })?;
    handle.join()
}

/// Wait up to `timeout` for uploads. Returns how many were abandoned.
async fn drain_uploads(store: &ObjectStoreBlobStore, timeout: Duration) -> usize {
    let pending = store.pending();
    if pending == 0 {
        return 0;
    }
    tracing::info!(pending, ?timeout, "waiting for uploads");
    match tokio::time::timeout(timeout, store.drain()).await {
        Ok(()) => 0,
        Err(_) => {
            tracing::warn!(pending, "upload drain timed out, remaining uploads canceled");
            pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use std::io::Write;

    const RECORDS: &str = r#"{"time_ms":1000,"channel":{"type":"TRAFFIC_DIRECT","wacn":1,"system_id":2,"rf_subsystem_id":3,"source_id":4,"destination_id":5},"frame":{"duid":"header","algorithm_id":128}}
{"time_ms":1001,"channel":{"type":"CONTROL"},"frame":{"duid":"trunk_signaling"}}
{"time_ms":1002,"channel":{"type":"TRAFFIC_DIRECT","wacn":1,"system_id":2,"rf_subsystem_id":3,"source_id":4,"destination_id":5},"frame":{"duid":"logical_link_b","voice":[[0,64,0,192]],"algorithm_id":128}}
{"time_ms":1003,"channel":{"type":"TRAFFIC_DIRECT","wacn":1,"system_id":2,"rf_subsystem_id":3,"source_id":4,"destination_id":5},"frame":{"duid":"terminator"}}
"#;

    fn write_input(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("frames.jsonl");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn local_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Local;
        config.storage.local_root = dir.join("store");
        config.source.checkpoint_path = Some(dir.join("position"));
        config
    }

    #[tokio::test]
    async fn test_run_uploads_call_and_commits_everything() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), RECORDS);
        let config = local_config(dir.path());

        let summary = run_stream_command(config, Some(input), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.committed, Some(3));
        assert_eq!(summary.metrics.uploads_succeeded, 1);
        assert_eq!(summary.abandoned_uploads, 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("position")).unwrap(),
            "3"
        );

        let call_dir = dir.path().join("store/calls/1/2/3");
        let names: Vec<String> = std::fs::read_dir(&call_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("TRAFFIC_DIRECT") && n.ends_with(".wav")));
        assert!(names.iter().any(|n| n.ends_with(".wav.json")));
    }

    #[tokio::test]
    async fn test_corrupt_frame_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = r#"{"time_ms":1,"channel":{"type":"TRAFFIC_DIRECT","wacn":1,"system_id":2,"rf_subsystem_id":3,"source_id":4,"destination_id":5},"frame":{"duid":"terminator"},"intact":false}
"#;
        let input = write_input(dir.path(), corrupt);

        let err = run_stream_command(local_config(dir.path()), Some(input), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(!dir.path().join("position").exists());
    }

    #[tokio::test]
    async fn test_open_call_holding_too_many_records_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<&str> = RECORDS.lines().collect();
        // Header, one voice frame that opens a call, then control traffic only.
        let mut lines = vec![records[0], records[2]];
        lines.extend([records[1]; 4]);
        let input = write_input(dir.path(), &(lines.join("\n") + "\n"));
        let mut config = local_config(dir.path());
        config.source.max_held = 2;
        config.call.inactive_check_rate = 0.01;

        let err = run_stream_command(config, Some(input), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::CheckpointBacklog { held: 3, limit: 2 }));
        // The open call's voice frame on line 1 is still outstanding.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("position")).unwrap(),
            "0"
        );
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.call.max_chunk_samples = 0;

        let err = run_stream_command(config, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("max_chunk_samples"));
    }

    #[test]
    fn test_render_config_is_valid_toml() {
        let text = render_config(&Config::default()).unwrap();
        assert!(text.contains("[call]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
