//! Per-chunk signal quality metrics.
//!
//! One [`QualityMonitor`] lives inside each device session and is fed every
//! chunk, gated or not: the readings drive operator telemetry and the noise
//! floor behind SNR, so skipping them would blind both.

use crate::noise::{NoiseFloor, NoiseFloorConfig};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// dBFS reported for silence instead of negative infinity.
pub const DBFS_FLOOR: f32 = -96.0;

/// A sample clips when its magnitude is within one quantization step of
/// full scale.
const CLIP_LEVEL: u16 = (i16::MAX - 1) as u16;

/// Fraction of clipping samples above which a chunk is flagged `clipped`.
const CLIP_FRACTION: f32 = 0.01;

/// Signal statistics derived from one chunk.
///
/// `rms` and `peak` are normalized to `[0, 1]` of full scale. All dB values
/// are finite; silence bottoms out at [`DBFS_FLOOR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReading {
    /// Root-mean-square amplitude.
    pub rms: f32,
    /// Peak absolute amplitude.
    pub peak: f32,
    /// RMS level relative to full scale, in dB.
    pub dbfs: f32,
    /// RMS level over the current noise-floor estimate, in dB.
    pub snr_db: f32,
    /// Peak level over RMS level (crest factor), in dB.
    pub dynamic_range_db: f32,
    /// Number of samples at or within one step of full scale.
    pub clipping_count: usize,
    /// True when clipping samples exceed 1% of the chunk.
    pub clipped: bool,
    /// The noise-floor estimate used for `snr_db`.
    pub noise_floor: f32,
    /// True while the noise floor is still warming up; SNR confidence is
    /// reduced until this clears.
    pub provisional: bool,
}

/// Computes per-chunk readings and maintains the device's noise floor.
pub struct QualityMonitor {
    floor: NoiseFloor,
}

impl QualityMonitor {
    /// Creates a monitor with default noise-floor configuration.
    pub fn new() -> Self {
        Self::with_config(NoiseFloorConfig::default())
    }

    /// Creates a monitor with the given noise-floor configuration.
    pub fn with_config(cfg: NoiseFloorConfig) -> Self {
        Self {
            floor: NoiseFloor::with_config(cfg),
        }
    }

    /// Measures one chunk and folds its RMS into the noise floor.
    pub fn measure(&mut self, samples: &[i16]) -> QualityReading {
        let mut sum_sq = 0.0f64;
        let mut peak = 0.0f32;
        let mut clipping_count = 0usize;
        for &s in samples {
            let v = s as f64 / 32768.0;
            sum_sq += v * v;
            let a = v.abs() as f32;
            if a > peak {
                peak = a;
            }
            if s.unsigned_abs() >= CLIP_LEVEL {
                clipping_count += 1;
            }
        }
        let rms = if samples.is_empty() {
            0.0
        } else {
            (sum_sq / samples.len() as f64).sqrt() as f32
        };

        self.floor.observe(rms);
        let noise_floor = self.floor.value();

        let dbfs = amplitude_db(rms);
        let peak_db = amplitude_db(peak);
        let reading = QualityReading {
            rms,
            peak,
            dbfs,
            snr_db: dbfs - amplitude_db(noise_floor),
            dynamic_range_db: peak_db - dbfs,
            clipping_count,
            clipped: !samples.is_empty()
                && clipping_count as f32 > CLIP_FRACTION * samples.len() as f32,
            noise_floor,
            provisional: self.floor.is_provisional(),
        };
        trace!(
            "chunk quality: dbfs={:.1} snr={:.1} peak={:.3} clipped={}",
            reading.dbfs, reading.snr_db, reading.peak, reading.clipped
        );
        reading
    }

    /// Returns the current noise-floor estimate.
    pub fn noise_floor(&self) -> f32 {
        self.floor.value()
    }
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a normalized amplitude to dB relative to full scale,
/// bottoming out at [`DBFS_FLOOR`].
pub fn amplitude_db(a: f32) -> f32 {
    if a <= 0.0 {
        return DBFS_FLOOR;
    }
    (20.0 * a.log10()).max(DBFS_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amplitude: f32, samples: usize) -> Vec<i16> {
        // 1kHz at 16kHz: 16 samples per cycle.
        (0..samples)
            .map(|i| {
                let t = i as f32 / 16.0 * 2.0 * std::f32::consts::PI;
                (t.sin() * amplitude * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn silence_has_finite_metrics() {
        let mut monitor = QualityMonitor::new();
        let reading = monitor.measure(&vec![0i16; 2048]);
        assert_eq!(reading.rms, 0.0);
        assert_eq!(reading.dbfs, DBFS_FLOOR);
        assert!(reading.snr_db.is_finite());
        assert!(reading.dynamic_range_db.is_finite());
        assert!(!reading.clipped);
    }

    #[test]
    fn empty_chunk_has_finite_metrics() {
        let mut monitor = QualityMonitor::new();
        let reading = monitor.measure(&[]);
        assert_eq!(reading.dbfs, DBFS_FLOOR);
        assert!(reading.snr_db.is_finite());
    }

    #[test]
    fn sine_rms_and_dbfs() {
        let mut monitor = QualityMonitor::new();
        let reading = monitor.measure(&sine(0.5, 2048));
        // Half-scale sine: RMS = 0.5 / sqrt(2) ~ 0.354, dBFS ~ -9.0.
        assert!((reading.rms - 0.354).abs() < 0.01, "rms {}", reading.rms);
        assert!((reading.dbfs + 9.0).abs() < 0.3, "dbfs {}", reading.dbfs);
        // Crest factor of a sine: ~3.0 dB.
        assert!(
            (reading.dynamic_range_db - 3.0).abs() < 0.3,
            "dr {}",
            reading.dynamic_range_db
        );
    }

    #[test]
    fn square_wave_clips() {
        let mut monitor = QualityMonitor::new();
        let wave: Vec<i16> = (0..2048)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let reading = monitor.measure(&wave);
        assert_eq!(reading.clipping_count, 2048);
        assert!(reading.clipped);
    }

    #[test]
    fn occasional_full_scale_sample_is_not_clipping() {
        let mut monitor = QualityMonitor::new();
        let mut wave = vec![100i16; 2048];
        wave[7] = i16::MAX;
        let reading = monitor.measure(&wave);
        assert_eq!(reading.clipping_count, 1);
        assert!(!reading.clipped);
    }

    #[test]
    fn snr_rises_above_warm_floor() {
        let mut monitor = QualityMonitor::new();
        // Quiet warm-up, then speech-level signal.
        let quiet = sine(0.005, 2048);
        for _ in 0..12 {
            monitor.measure(&quiet);
        }
        let reading = monitor.measure(&sine(0.5, 2048));
        assert!(!reading.provisional);
        assert!(reading.snr_db > 30.0, "snr {}", reading.snr_db);
    }

    #[test]
    fn provisional_clears_after_warmup() {
        let mut monitor = QualityMonitor::new();
        let chunk = sine(0.01, 2048);
        for i in 0..11 {
            let reading = monitor.measure(&chunk);
            assert!(reading.provisional, "chunk {} should be provisional", i);
        }
        // The reading that completes warm-up already uses the seeded floor.
        assert!(!monitor.measure(&chunk).provisional);
    }

    #[test]
    fn reading_serializes() {
        let mut monitor = QualityMonitor::new();
        let reading = monitor.measure(&sine(0.2, 256));
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"snr_db\""));
        assert!(json.contains("\"dynamic_range_db\""));
        let back: QualityReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
