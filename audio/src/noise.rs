//! Adaptive noise-floor estimation.
//!
//! Each device session owns one `NoiseFloor`. The estimate seeds itself from
//! the quietest chunk seen during a short warm-up phase, then decays toward
//! quiet chunks only, so speech can never inflate it. Readings taken before
//! warm-up completes are provisional: the SNR they produce is usable but
//! should be trusted less by consumers.

/// Configuration for [`NoiseFloor`].
#[derive(Debug, Clone)]
pub struct NoiseFloorConfig {
    /// Lower bound for the floor estimate, in normalized RMS (default: 1e-4).
    /// Keeps SNR finite on dead-quiet channels.
    pub min_floor: f32,
    /// Smoothing factor for the quiet-chunk update (default: 0.1).
    pub alpha: f32,
    /// Number of chunks in the warm-up phase (default: 12).
    pub warmup_chunks: usize,
}

impl Default for NoiseFloorConfig {
    fn default() -> Self {
        Self {
            min_floor: 1e-4,
            alpha: 0.1,
            warmup_chunks: 12,
        }
    }
}

/// Per-device ambient energy estimate.
///
/// Values are normalized RMS in `[0, 1]`, matching [`crate::QualityReading`].
#[derive(Debug)]
pub struct NoiseFloor {
    floor: f32,
    min_floor: f32,
    alpha: f32,
    warmup_left: usize,
    warmup_min: f32,
}

impl NoiseFloor {
    /// Creates a noise floor with default configuration.
    pub fn new() -> Self {
        Self::with_config(NoiseFloorConfig::default())
    }

    /// Creates a noise floor with the given configuration.
    /// Out-of-range values fall back to their defaults.
    pub fn with_config(cfg: NoiseFloorConfig) -> Self {
        let defaults = NoiseFloorConfig::default();
        let min_floor = if cfg.min_floor > 0.0 {
            cfg.min_floor
        } else {
            defaults.min_floor
        };
        let alpha = if cfg.alpha > 0.0 && cfg.alpha <= 1.0 {
            cfg.alpha
        } else {
            defaults.alpha
        };
        let warmup_chunks = cfg.warmup_chunks.max(1);
        Self {
            floor: min_floor,
            min_floor,
            alpha,
            warmup_left: warmup_chunks,
            warmup_min: f32::INFINITY,
        }
    }

    /// Folds one chunk's RMS into the estimate.
    ///
    /// During warm-up the floor tracks the minimum non-zero RMS seen so far.
    /// Afterwards only chunks quieter than the current floor move it, by an
    /// exponential step, and never below the configured minimum.
    pub fn observe(&mut self, rms: f32) {
        if self.warmup_left > 0 {
            if rms > 0.0 && rms < self.warmup_min {
                self.warmup_min = rms;
                self.floor = self.warmup_min.max(self.min_floor);
            }
            self.warmup_left -= 1;
            return;
        }
        if rms > 0.0 && rms < self.floor {
            self.floor += self.alpha * (rms - self.floor);
            if self.floor < self.min_floor {
                self.floor = self.min_floor;
            }
        }
    }

    /// Returns the current floor estimate (always >= the configured minimum).
    pub fn value(&self) -> f32 {
        self.floor
    }

    /// Returns true while the warm-up phase has not completed.
    pub fn is_provisional(&self) -> bool {
        self.warmup_left > 0
    }
}

impl Default for NoiseFloor {
    fn default() -> Self {
        Self::new()
    }
}
