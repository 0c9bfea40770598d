//! Registry of live per-channel pipelines.
//!
//! Frames are routed by channel identity; a pipeline is created on the first
//! frame for a channel and evicted by the periodic inactivity sweep.
//!
//! The registry lock is held while a frame is forwarded. A sweep therefore
//! never evicts a pipeline between the lookup and the delivery of a frame,
//! and an evicted pipeline never receives anything further.

use crate::call::chunk::CheckpointedFrame;
use crate::call::slicer::CallPipeline;
use crate::clock::{Clock, SystemClock};
use crate::observer::{CallObserver, NoopObserver};
use crate::pipeline::CallPipelineFactory;
use crate::protocol::ChannelId;
use crossbeam_channel::{Sender, bounded, select, tick};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct CallManager {
    pipelines: Mutex<HashMap<String, Arc<dyn CallPipeline>>>,
    factory: Arc<dyn CallPipelineFactory>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn CallObserver>,
}

impl CallManager {
    pub fn new(factory: Arc<dyn CallPipelineFactory>) -> Self {
        Self {
            pipelines: Mutex::new(HashMap::new()),
            factory,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Route a frame to its channel's pipeline, creating the pipeline if needed.
    pub fn process(&self, channel: ChannelId, frame: CheckpointedFrame) {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        let pipeline = pipelines.entry(channel.key()).or_insert_with(|| {
            tracing::info!(%channel, "creating call pipeline");
            self.observer.pipeline_created(&channel);
            self.factory.create(channel)
        });
        pipeline.consume(frame);
    }

    /// Evict every pipeline that reports inactive as of now.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now_millis())
    }

    /// Evict every pipeline that reports inactive as of `now_millis`.
    ///
    /// Returns the number of pipelines evicted.
    pub fn sweep_at(&self, now_millis: i64) -> usize {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        let before = pipelines.len();
        pipelines.retain(|_, pipeline| {
            if !pipeline.is_inactive(now_millis) {
                return true;
            }
            let channel = pipeline.channel_id();
            tracing::info!(%channel, "evicting inactive call pipeline");
            self.observer.pipeline_evicted(&channel);
            false
        });
        before - pipelines.len()
    }

    /// Close every open call regardless of age. Used at shutdown.
    pub fn finalize_all(&self) -> usize {
        self.sweep_at(i64::MAX)
    }

    /// Number of live pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run [`sweep`](Self::sweep) every `period` on a background thread.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> std::io::Result<SweeperHandle> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let manager = Arc::clone(self);
        let ticker = tick(period);

        let thread = thread::Builder::new()
            .name("call-sweeper".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let evicted = manager.sweep();
                            if evicted > 0 {
                                tracing::debug!(
                                    evicted,
                                    live = manager.pipeline_count(),
                                    "inactivity sweep"
                                );
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
            })?;

        Ok(SweeperHandle {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to the background sweep thread. Stops the thread when dropped.
pub struct SweeperHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Dropping the sender disconnects the channel, which wakes the select.
        self.shutdown.take();
        if let Some(thread) = self.thread.take()
            && let Err(panic_info) = thread.join()
        {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            tracing::error!("sweeper thread panicked: {msg}");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
