//! WAV encoding for finished calls.

use crate::defaults::{BITS_PER_SAMPLE, CHANNEL_COUNT, SAMPLE_RATE};
use crate::error::Result;
use std::io::Cursor;

/// Format every call artifact is written in: 8kHz mono 16-bit PCM.
pub fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNEL_COUNT,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Convert a normalized sample to 16-bit PCM. Out-of-range input saturates.
pub fn to_pcm(sample: f32) -> i16 {
    (sample * i16::MAX as f32) as i16
}

/// Encode the concatenation of `segments` as an in-memory WAV file.
///
/// Returns `None` when there are no samples at all, so callers can tell an
/// empty call apart from a short one.
pub fn encode_wav<'a>(segments: impl IntoIterator<Item = &'a [f32]>) -> Result<Option<Vec<u8>>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut written = 0usize;
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec())?;
        for segment in segments {
            for &sample in segment {
                writer.write_sample(to_pcm(sample))?;
            }
            written += segment.len();
        }
        writer.finalize()?;
    }

    if written == 0 {
        return Ok(None);
    }
    Ok(Some(cursor.into_inner()))
}

/// Read back the PCM samples of a WAV produced by [`encode_wav`].
pub fn read_wav_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(samples)
}
