//! PCM audio primitives for the ingestion gateway.
//!
//! This crate provides:
//!
//! - `format`: fixed PCM stream format (16-bit LE mono) and duration math
//! - `chunk`: the `AudioChunk` unit flowing through the pipeline
//! - `quality`: per-chunk signal metrics (RMS, peak, dBFS, clipping, SNR)
//! - `noise`: the per-device adaptive noise floor behind the SNR estimate
//!
//! # Example
//!
//! ```rust
//! use auris_audio::{Format, QualityMonitor};
//!
//! let format = Format::MONO_16K;
//! assert_eq!(format.bytes_in_duration(std::time::Duration::from_millis(100)), 3200);
//!
//! let mut monitor = QualityMonitor::new();
//! let reading = monitor.measure(&vec![0i16; 1600]);
//! assert!(reading.dbfs.is_finite());
//! ```

mod chunk;
mod error;
mod format;
mod noise;
mod quality;

pub use chunk::{samples_from_le, samples_to_le, AudioChunk};
pub use error::AudioError;
pub use format::{Format, SAMPLE_BYTES};
pub use noise::{NoiseFloor, NoiseFloorConfig};
pub use quality::{amplitude_db, QualityMonitor, QualityReading, DBFS_FLOOR};
