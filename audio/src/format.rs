//! PCM stream format.
//!
//! Boards stream 16-bit signed little-endian mono PCM at a sample rate agreed
//! out of band. The format carries that rate and the byte/duration arithmetic
//! used by the chunker and the publish payloads.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per sample: 16-bit mono.
pub const SAMPLE_BYTES: usize = 2;

/// Describes a PCM audio stream (16-bit signed LE, mono).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
}

impl Format {
    /// Creates a format with the given sample rate.
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Returns the number of bytes per second of audio.
    pub fn bytes_rate(&self) -> u64 {
        self.sample_rate as u64 * SAMPLE_BYTES as u64
    }

    /// Returns the number of whole samples covering the given duration.
    pub fn samples_in_duration(&self, d: Duration) -> usize {
        (self.sample_rate as u128 * d.as_nanos() / 1_000_000_000) as usize
    }

    /// Returns the number of bytes covering the given duration,
    /// rounded down to a whole sample.
    pub fn bytes_in_duration(&self, d: Duration) -> u64 {
        (self.samples_in_duration(d) * SAMPLE_BYTES) as u64
    }

    /// Returns the duration represented by a byte count.
    pub fn duration(&self, bytes: u64) -> Duration {
        self.duration_of_samples(bytes as usize / SAMPLE_BYTES)
    }

    /// Returns the duration represented by a sample count.
    pub fn duration_of_samples(&self, samples: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = samples as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }
}

// Common format presets
impl Format {
    /// 16kHz mono, the board firmware default.
    pub const MONO_16K: Format = Format::new(16000);
    /// 8kHz mono (telephony-grade boards).
    pub const MONO_8K: Format = Format::new(8000);
}

impl Default for Format {
    fn default() -> Self {
        Format::MONO_16K
    }
}
