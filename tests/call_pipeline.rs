//! End-to-end call segmentation: manager → slicer → filter → aggregator → store.
//!
//! Every frame carries a checkpoint from a shared tracker, so each test can
//! assert exactly how far the durable stream position has moved.

use callslicer::call::chunk::CheckpointedFrame;
use callslicer::call::decoder::{MockDecoder, VoiceDecoder};
use callslicer::call::manager::CallManager;
use callslicer::checkpoint::CheckpointTracker;
use callslicer::clock::MockClock;
use callslicer::config::CallConfig;
use callslicer::observer::CallMetrics;
use callslicer::pipeline::{DecoderFactory, WavPipelineFactory};
use callslicer::protocol::{ChannelId, Frame, LinkControl, VoiceFrame};
use callslicer::storage::{MockBlobStore, UploadOutcome};
use callslicer::wav::read_wav_samples;
use callslicer::wav::writer::to_pcm;
use std::cell::Cell;
use std::sync::Arc;

const T0: i64 = 1_700_000_000_000;
const SAMPLES_PER_FRAME: usize = 10;

struct Rig {
    manager: CallManager,
    store: Arc<MockBlobStore>,
    clock: MockClock,
    tracker: CheckpointTracker,
    metrics: Arc<CallMetrics>,
    sequence: Cell<u64>,
}

impl Rig {
    fn new(max_chunk_samples: usize) -> Self {
        Self::with_store(max_chunk_samples, MockBlobStore::new())
    }

    fn with_store(max_chunk_samples: usize, store: MockBlobStore) -> Self {
        Self::build(
            max_chunk_samples,
            store,
            Arc::new(|| Box::new(MockDecoder::new(SAMPLES_PER_FRAME)) as Box<dyn VoiceDecoder>),
        )
    }

    fn build(max_chunk_samples: usize, store: MockBlobStore, decoder: DecoderFactory) -> Self {
        let config = CallConfig {
            max_chunk_samples,
            min_frame_rate: 2.0,
            terminator_timeout_ms: 1000,
            ..CallConfig::default()
        };
        let store = Arc::new(store);
        let clock = MockClock::new(T0);
        let metrics = Arc::new(CallMetrics::new());
        let factory = WavPipelineFactory::new(
            config,
            decoder,
            store.clone(),
            "calls/",
        )
        .with_clock(Arc::new(clock.clone()))
        .with_observer(metrics.clone());
        let manager = CallManager::new(Arc::new(factory))
            .with_clock(Arc::new(clock.clone()))
            .with_observer(metrics.clone());

        Self {
            manager,
            store,
            clock,
            tracker: CheckpointTracker::new(0),
            metrics,
            sequence: Cell::new(0),
        }
    }

    fn send(&self, channel: ChannelId, timestamp: i64, frame: Frame) {
        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        let checkpoint = self.tracker.handle(sequence);
        self.manager.process(
            channel,
            CheckpointedFrame::new(timestamp, 47.5, -122.25, frame, checkpoint),
        );
    }

    fn committed(&self) -> Option<u64> {
        self.tracker.committed()
    }
}

fn direct() -> ChannelId {
    ChannelId::direct(1, 2, 3, 4, 5)
}

fn voice() -> Vec<VoiceFrame> {
    vec![VoiceFrame::new(vec![0u8; 18])]
}

fn hdu(algorithm_id: u8) -> Frame {
    Frame::Header { algorithm_id }
}

fn lldu1(source_id: u32) -> Frame {
    Frame::LogicalLinkA {
        voice: voice(),
        link_control: LinkControl::group_voice_user(source_id),
    }
}

fn lldu2(algorithm_id: u8) -> Frame {
    Frame::LogicalLinkB {
        voice: voice(),
        algorithm_id,
    }
}

fn wav_len(samples: usize) -> usize {
    44 + 2 * samples
}

/// Decodes every frame to the next run of a per-channel sample counter.
struct CountingDecoder {
    next: u32,
}

impl VoiceDecoder for CountingDecoder {
    fn decode(&mut self, _payload: &[u8]) -> callslicer::Result<Vec<f32>> {
        Ok((0..SAMPLES_PER_FRAME)
            .map(|_| {
                self.next += 1;
                self.next as f32 / 1000.0
            })
            .collect())
    }
}

#[test]
fn terminated_call_uploads_once_and_commits_after_completion() {
    let rig = Rig::new(8192);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0));
    rig.send(direct(), T0 + 2, lldu2(0x80));
    rig.send(direct(), T0 + 3, Frame::Terminator);

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];
    assert_eq!(upload.key, format!("calls/1/2/3/TRAFFIC_DIRECT:4:5:{T0}.wav"));
    assert_eq!(upload.bytes.len(), wav_len(2 * SAMPLES_PER_FRAME));
    assert_eq!(
        read_wav_samples(&upload.bytes).unwrap().len(),
        2 * SAMPLES_PER_FRAME
    );
    assert!(upload.metadata.terminated);
    assert_eq!(upload.metadata.start_time, Some(T0));
    assert_eq!(upload.metadata.end_time, Some(T0 + 3));
    assert_eq!(upload.metadata.latitude, 47.5);
    assert_eq!(upload.metadata.longitude, -122.25);
    assert_eq!(upload.metadata.content_length, upload.bytes.len());

    // The header closed an empty call on arrival; the rest waits for the store.
    assert_eq!(rig.committed(), Some(0));
    assert_eq!(rig.store.complete_all(), 1);
    assert_eq!(rig.committed(), Some(3));
    assert_eq!(rig.metrics.snapshot().uploads_succeeded, 1);
}

#[test]
fn call_split_across_chunks_is_one_artifact() {
    let rig = Rig::new(2 * SAMPLES_PER_FRAME);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0));
    rig.send(direct(), T0 + 2, lldu2(0x80));
    rig.send(direct(), T0 + 3, lldu1(0));
    rig.send(direct(), T0 + 4, lldu2(0x80));
    assert!(rig.store.uploads().is_empty());

    rig.send(direct(), T0 + 5, Frame::Terminator);

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].bytes.len(), wav_len(4 * SAMPLES_PER_FRAME));
    assert_eq!(uploads[0].metadata.start_time, Some(T0));
    assert_eq!(uploads[0].metadata.end_time, Some(T0 + 5));

    rig.store.complete_all();
    assert_eq!(rig.committed(), Some(5));
}

#[test]
fn split_call_artifact_preserves_sample_order() {
    let rig = Rig::build(
        2 * SAMPLES_PER_FRAME,
        MockBlobStore::new(),
        Arc::new(|| Box::new(CountingDecoder { next: 0 }) as Box<dyn VoiceDecoder>),
    );
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0));
    rig.send(direct(), T0 + 2, lldu2(0x80));
    rig.send(direct(), T0 + 3, lldu1(0));
    rig.send(direct(), T0 + 4, lldu2(0x80));
    rig.send(direct(), T0 + 5, Frame::Terminator);

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    let expected: Vec<i16> = (1..=4 * SAMPLES_PER_FRAME as u32)
        .map(|n| to_pcm(n as f32 / 1000.0))
        .collect();
    assert_eq!(read_wav_samples(&uploads[0].bytes).unwrap(), expected);
}

#[test]
fn encrypted_call_commits_without_upload() {
    let rig = Rig::new(8192);
    rig.send(direct(), T0, hdu(0x84));
    rig.send(direct(), T0 + 1, lldu1(0));
    rig.send(direct(), T0 + 2, lldu2(0x84));
    rig.send(direct(), T0 + 3, Frame::Terminator);

    assert!(rig.store.uploads().is_empty());
    assert_eq!(rig.committed(), Some(3));
    let metrics = rig.metrics.snapshot();
    assert_eq!(metrics.encrypted_voice_frames, 2);
    assert_eq!(metrics.chunks_dropped, 2);
}

#[test]
fn terminator_timeout_closes_previous_call() {
    let rig = Rig::new(8192);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0));
    rig.send(direct(), T0 + 2, lldu2(0x80));
    rig.send(direct(), T0 + 2 + 1001, lldu2(0x80));

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(!uploads[0].metadata.terminated);
    assert_eq!(uploads[0].metadata.start_time, Some(T0));
    assert_eq!(uploads[0].metadata.end_time, Some(T0 + 2));

    rig.store.complete_all();
    // The late frame opened the next call and stays held.
    assert_eq!(rig.committed(), Some(2));
    assert_eq!(rig.metrics.snapshot().terminator_timeouts, 1);
}

#[test]
fn inactive_channel_is_finalized_and_evicted() {
    let rig = Rig::new(8192);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0));
    assert_eq!(rig.manager.pipeline_count(), 1);

    // Still inside the window at 2 frames/s.
    assert_eq!(rig.manager.sweep_at(T0 + 400), 0);

    rig.clock.set(T0 + 10_000);
    assert_eq!(rig.manager.sweep(), 1);
    assert_eq!(rig.manager.pipeline_count(), 0);

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(!uploads[0].metadata.terminated);
    assert_eq!(uploads[0].key, format!("calls/1/2/3/TRAFFIC_DIRECT:4:5:{}.wav", T0 + 10_000));

    rig.store.complete_all();
    assert_eq!(rig.committed(), Some(1));
    assert_eq!(rig.metrics.snapshot().pipelines_evicted, 1);
}

#[test]
fn failed_upload_withholds_checkpoints() {
    let rig = Rig::with_store(
        8192,
        MockBlobStore::new().with_outcome(UploadOutcome::Failed("bucket gone".to_string())),
    );
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu2(0x80));
    rig.send(direct(), T0 + 2, Frame::Terminator);

    assert_eq!(rig.store.uploads().len(), 1);
    assert_eq!(rig.committed(), Some(0));
    let metrics = rig.metrics.snapshot();
    assert_eq!(metrics.uploads_failed, 1);
    assert_eq!(metrics.uploads_succeeded, 0);
}

#[test]
fn interleaved_channels_commit_in_stream_order() {
    let rig = Rig::new(8192);
    let other = ChannelId::group(1, 2, 3, 0, 77, 851.0125);

    rig.send(direct(), T0, hdu(0x80)); // 0
    rig.send(other, T0, hdu(0x80)); // 1
    rig.send(direct(), T0 + 1, lldu2(0x80)); // 2
    rig.send(other, T0 + 1, lldu2(0x80)); // 3
    rig.send(other, T0 + 2, Frame::Terminator); // 4
    assert_eq!(rig.manager.pipeline_count(), 2);

    // The group call is stored, but the direct call still holds record 2.
    rig.store.complete_all();
    assert_eq!(rig.committed(), Some(1));

    rig.send(direct(), T0 + 2, Frame::Terminator); // 5
    rig.store.complete_all();
    assert_eq!(rig.committed(), Some(5));
    assert_eq!(rig.store.uploads().len(), 2);
}

#[test]
fn source_unit_from_link_control_names_the_artifact() {
    let rig = Rig::new(8192);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu1(0x1020));
    rig.send(direct(), T0 + 2, Frame::Terminator);

    let uploads = rig.store.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].metadata.channel_id, "1/2/3/TRAFFIC_DIRECT:4128:5");
    assert!(uploads[0].key.starts_with("calls/1/2/3/TRAFFIC_DIRECT:4128:5:"));
}

#[test]
fn finalize_all_flushes_every_open_call() {
    let rig = Rig::new(8192);
    let other = ChannelId::group(1, 2, 3, 0, 77, 851.0125);
    rig.send(direct(), T0, hdu(0x80));
    rig.send(direct(), T0 + 1, lldu2(0x80));
    rig.send(other, T0, hdu(0x80));
    rig.send(other, T0 + 1, lldu2(0x80));

    assert_eq!(rig.manager.finalize_all(), 2);
    assert_eq!(rig.manager.pipeline_count(), 0);
    assert_eq!(rig.store.complete_all(), 2);
    assert_eq!(rig.committed(), Some(3));
}
