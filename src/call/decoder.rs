//! Voice codec adapter.
//!
//! The codec itself is pluggable through [`VoiceDecoder`]. [`SafeDecoder`]
//! wraps it so a single bad voice frame degrades to a short burst of silence
//! instead of aborting the call.

use crate::defaults::DECODE_FAILURE_SAMPLES;
use crate::error::{CallError, Result};
use crate::observer::{CallObserver, NoopObserver};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Trait for voice codecs producing normalized PCM.
///
/// This trait allows swapping implementations (real codec vs mock).
pub trait VoiceDecoder: Send {
    /// Decode one compressed voice payload.
    ///
    /// # Returns
    /// Samples at 8kHz mono, normalized to [-1.0, 1.0]
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "decoder"
    }
}

/// Decoder wrapper that never fails.
pub struct SafeDecoder {
    inner: Box<dyn VoiceDecoder>,
    observer: Arc<dyn CallObserver>,
}

impl SafeDecoder {
    pub fn new(inner: Box<dyn VoiceDecoder>) -> Self {
        Self {
            inner,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Decode a payload, substituting silence if the codec errors or panics.
    pub fn decode(&mut self, payload: &[u8]) -> Vec<f32> {
        let inner = &mut self.inner;
        let result = catch_unwind(AssertUnwindSafe(|| inner.decode(payload)));

        let failure = match result {
            Ok(Ok(samples)) => return samples,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "codec panicked".to_string(),
        };

        tracing::error!(
            decoder = self.inner.name(),
            payload_len = payload.len(),
            error = %failure,
            fallback_samples = DECODE_FAILURE_SAMPLES,
            "voice frame failed to decode, substituting silence"
        );
        self.observer.decode_failed();
        vec![0.0; DECODE_FAILURE_SAMPLES]
    }
}

/// Treats each payload as raw little-endian signed 16-bit PCM.
///
/// Stands in for a real codec when the upstream already carries PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmDecoder;

impl VoiceDecoder for PcmDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        if payload.len() % 2 != 0 {
            return Err(CallError::Decode {
                message: format!("odd PCM payload length {}", payload.len()),
            });
        }
        Ok(payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect())
    }

    fn name(&self) -> &'static str {
        "pcm"
    }
}

/// Mock decoder for testing
#[derive(Debug, Clone)]
pub struct MockDecoder {
    samples: Vec<f32>,
    should_fail: bool,
}

impl MockDecoder {
    /// Decoder returning `len` silent samples per payload.
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
            should_fail: false,
        }
    }

    /// Configure the mock to return specific samples
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the mock to fail on decode
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl VoiceDecoder for MockDecoder {
    fn decode(&mut self, _payload: &[u8]) -> Result<Vec<f32>> {
        if self.should_fail {
            Err(CallError::Decode {
                message: "mock decode failure".to_string(),
            })
        } else {
            Ok(self.samples.clone())
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
