//! Newline-delimited JSON frame stream.
//!
//! A reader thread parses one [`StreamRecord`] per line and feeds a bounded
//! queue. Each record carries a checkpoint bound to a shared
//! [`CheckpointTracker`], keyed by its zero-based line number, so the durable
//! position only ever covers lines whose derived artifacts are settled.

use crate::checkpoint::{Checkpoint, CheckpointTracker};
use crate::consumer::StreamRecord;
use crate::error::Result;
use crossbeam_channel::{Receiver, bounded};
use std::io::BufRead;
use std::thread::{self, JoinHandle};

/// A parsed record and the handle that acknowledges it.
#[derive(Debug)]
pub struct SourceItem {
    pub sequence: u64,
    pub record: StreamRecord,
    pub checkpoint: Checkpoint,
}

pub struct JsonLinesSource {
    tracker: CheckpointTracker,
    resume_after: Option<u64>,
}

impl JsonLinesSource {
    /// Source starting at the first line.
    pub fn new() -> Self {
        Self {
            tracker: CheckpointTracker::new(0),
            resume_after: None,
        }
    }

    /// Source that skips every line up to and including `position`.
    pub fn resuming_after(position: Option<u64>) -> Self {
        let start = position.map_or(0, |p| p + 1);
        Self {
            tracker: CheckpointTracker::new(start),
            resume_after: position,
        }
    }

    /// Persist the committed position to `path` as it advances.
    pub fn with_persist_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.tracker = self.tracker.with_persist_path(path);
        self
    }

    /// Fail the stream once more than `limit` released records wait behind
    /// an unreleased one.
    pub fn with_max_held(mut self, limit: usize) -> Self {
        self.tracker = self.tracker.with_max_held(limit);
        self
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    /// Start reading `reader` on a background thread.
    pub fn spawn<R>(self, reader: R, queue_size: usize) -> std::io::Result<SourceHandle>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = bounded(queue_size);
        let tracker = self.tracker.clone();
        let resume_after = self.resume_after;

        let thread = thread::Builder::new()
            .name("stream-reader".to_string())
            .spawn(move || -> Result<u64> {
                let mut read = 0u64;
                // Raw bytes: a line that is not UTF-8 is a bad record, not a read failure.
                for (index, line) in reader.split(b'\n').enumerate() {
                    let mut line = line?;
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    let sequence = index as u64;
                    read += 1;
                    if resume_after.is_some_and(|position| sequence <= position) {
                        continue;
                    }

                    let checkpoint = tracker.handle(sequence);
                    if line.trim_ascii().is_empty() {
                        checkpoint.checkpoint();
                        continue;
                    }
                    let record = match serde_json::from_slice::<StreamRecord>(&line) {
                        Ok(record) => record,
                        Err(e) => {
                            tracing::warn!(line = sequence, error = %e, "skipping malformed stream record");
                            checkpoint.checkpoint();
                            continue;
                        }
                    };

                    let item = SourceItem {
                        sequence,
                        record,
                        checkpoint,
                    };
                    if tx.send(item).is_err() {
                        tracing::debug!(line = sequence, "record queue closed, stopping reader");
                        break;
                    }
                }
                Ok(read)
            })?;

        Ok(SourceHandle {
            records: rx,
            tracker: self.tracker,
            thread,
        })
    }
}

impl Default for JsonLinesSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Running source: the record queue plus the reader thread.
pub struct SourceHandle {
    records: Receiver<SourceItem>,
    tracker: CheckpointTracker,
    thread: JoinHandle<Result<u64>>,
}

impl SourceHandle {
    pub fn records(&self) -> &Receiver<SourceItem> {
        &self.records
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    /// Wait for the reader to finish. Returns the number of lines read.
    pub fn join(self) -> Result<u64> {
        drop(self.records);
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => Err(crate::error::CallError::Other(
                "stream reader thread panicked".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(time_ms: i64) -> String {
        format!(
            r#"{{"time_ms":{time_ms},"channel":{{"type":"TRAFFIC_DIRECT","wacn":1,"system_id":2,"rf_subsystem_id":3,"source_id":4,"destination_id":5}},"frame":{{"duid":"terminator"}}}}"#
        )
    }

    fn input(lines: &[String]) -> Cursor<Vec<u8>> {
        Cursor::new(lines.join("\n").into_bytes())
    }

    #[test]
    fn test_reads_records_in_order() {
        let source = JsonLinesSource::new();
        let handle = source
            .spawn(input(&[line(10), line(20), line(30)]), 2)
            .unwrap();

        let items: Vec<SourceItem> = handle.records().iter().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items.iter().map(|i| i.record.time_ms).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(items[2].sequence, 2);
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn test_position_advances_only_past_contiguous_releases() {
        let handle = JsonLinesSource::new()
            .spawn(input(&[line(1), line(2), line(3)]), 8)
            .unwrap();
        let items: Vec<SourceItem> = handle.records().iter().collect();

        items[1].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), None);
        items[0].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), Some(1));
        items[2].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), Some(2));
    }

    #[test]
    fn test_malformed_and_blank_lines_are_acknowledged() {
        let lines = vec![line(1), "{not json".to_string(), String::new(), line(4)];
        let handle = JsonLinesSource::new().spawn(input(&lines), 8).unwrap();
        let items: Vec<SourceItem> = handle.records().iter().collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[1].sequence, 3);
        items[0].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), Some(2));
    }

    #[test]
    fn test_non_utf8_line_is_acknowledged_and_reading_continues() {
        let mut bytes = line(1).into_bytes();
        bytes.extend_from_slice(b"\n\xff\xfe{\"time_ms\":2}\r\n");
        bytes.extend_from_slice(line(3).as_bytes());
        bytes.extend_from_slice(b"\r\n");
        let handle = JsonLinesSource::new().spawn(Cursor::new(bytes), 8).unwrap();
        let items: Vec<SourceItem> = handle.records().iter().collect();

        assert_eq!(
            items.iter().map(|i| i.sequence).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(items[1].record.time_ms, 3);
        items[0].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), Some(1));
        items[1].checkpoint.checkpoint();
        assert_eq!(handle.tracker().committed(), Some(2));
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn test_resume_skips_committed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let position_file = dir.path().join("position");
        let lines = vec![line(1), line(2), line(3), line(4)];

        let handle = JsonLinesSource::resuming_after(Some(1))
            .with_persist_path(&position_file)
            .spawn(input(&lines), 8)
            .unwrap();
        let items: Vec<SourceItem> = handle.records().iter().collect();

        assert_eq!(
            items.iter().map(|i| i.sequence).collect::<Vec<_>>(),
            vec![2, 3]
        );
        for item in &items {
            item.checkpoint.checkpoint();
        }
        assert_eq!(CheckpointTracker::restore(&position_file).unwrap(), Some(3));
    }
}
