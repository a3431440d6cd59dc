//! Audio chunk type.

use crate::error::AudioError;
use crate::format::{Format, SAMPLE_BYTES};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A fixed-size block of PCM samples received from one board.
///
/// Chunks are immutable once built: the session stamps them with a monotonic
/// sequence number and the arrival time, then hands them down the pipeline by
/// value. Chunk boundaries carry no meaning on the wire; they are purely
/// receive-buffer slices.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    format: Format,
    seq: u64,
    received_at: DateTime<Utc>,
    samples: Vec<i16>,
}

impl AudioChunk {
    /// Creates a chunk from decoded samples.
    pub fn new(format: Format, seq: u64, received_at: DateTime<Utc>, samples: Vec<i16>) -> Self {
        Self {
            format,
            seq,
            received_at,
            samples,
        }
    }

    /// Returns the stream format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the per-session monotonic sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the arrival timestamp.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns the decoded samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the audio duration covered by this chunk.
    pub fn duration(&self) -> Duration {
        self.format.duration_of_samples(self.samples.len())
    }

    /// Consumes the chunk and returns its samples.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Decodes little-endian 16-bit PCM bytes into samples.
///
/// Fails if the slice does not split into whole samples; the caller decides
/// whether a dangling byte is buffered or treated as a data error.
pub fn samples_from_le(data: &[u8]) -> Result<Vec<i16>, AudioError> {
    if data.len() % SAMPLE_BYTES != 0 {
        return Err(AudioError::OddPcmLength(data.len()));
    }
    Ok(data
        .chunks_exact(SAMPLE_BYTES)
        .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]))
        .collect())
}

/// Encodes samples back into little-endian 16-bit PCM bytes.
pub fn samples_to_le(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * SAMPLE_BYTES);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}
