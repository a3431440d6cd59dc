//! Utterance embedding extraction.
//!
//! [`SpectralEmbedder`] is the built-in extractor: framed log band energies
//! on a mel-spaced triangular filterbank, pooled over time with mean and
//! standard deviation, L2-normalized. It is fully deterministic, which keeps
//! verification decisions reproducible. Heavier model-backed extractors
//! implement [`Embedder`] and drop in behind the same object-safe seam.

use crate::embedding::l2_normalize;
use crate::error::SpeakerError;
use std::f64::consts::PI;

/// Turns raw utterance samples into a fixed-length vector.
pub trait Embedder: Send + Sync {
    /// Extracts one embedding from 16-bit PCM samples.
    ///
    /// Fails on degenerate input (too short to frame, or silent); callers
    /// treat that as a dropped utterance, not a process error.
    fn embed(&self, samples: &[i16]) -> Result<Vec<f32>, SpeakerError>;

    /// Returns the embedding dimension this extractor produces.
    fn dimension(&self) -> usize;
}

/// Configuration for [`SpectralEmbedder`].
#[derive(Debug, Clone)]
pub struct SpectralConfig {
    /// Input sample rate in Hz (default: 16000).
    pub sample_rate: u32,
    /// Number of mel-spaced bands (default: 24). Dimension is twice this.
    pub num_bands: usize,
    /// Frame length in samples (default: 400 = 25ms @ 16kHz).
    pub frame_length: usize,
    /// Frame shift in samples (default: 160 = 10ms @ 16kHz).
    pub frame_shift: usize,
    /// Pre-emphasis coefficient (default: 0.97).
    pub pre_emphasis: f64,
    /// Low cutoff frequency in Hz (default: 60).
    pub low_freq: f64,
    /// High cutoff frequency in Hz (default: 7200).
    pub high_freq: f64,
    /// Minimum number of frames an utterance must yield (default: 5).
    pub min_frames: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            num_bands: 24,
            frame_length: 400,
            frame_shift: 160,
            pre_emphasis: 0.97,
            low_freq: 60.0,
            high_freq: 7200.0,
            min_frames: 5,
        }
    }
}

/// Deterministic spectral embedding extractor.
///
/// Window and filterbank are precomputed at construction; `embed` itself is
/// immutable state only and safe to call concurrently.
pub struct SpectralEmbedder {
    cfg: SpectralConfig,
    fft_size: usize,
    window: Vec<f64>,
    filterbank: Vec<Vec<f64>>,
}

/// Floor for band energies before the log, keeps values finite.
const ENERGY_FLOOR: f64 = 1e-10;

/// Normalized RMS below which an utterance counts as silent.
const SILENCE_RMS: f64 = 1e-5;

impl SpectralEmbedder {
    /// Creates an embedder with default configuration.
    pub fn new() -> Self {
        Self::with_config(SpectralConfig::default())
    }

    /// Creates an embedder with the given configuration.
    /// Out-of-range values fall back to their defaults.
    pub fn with_config(cfg: SpectralConfig) -> Self {
        let defaults = SpectralConfig::default();
        let mut cfg = cfg;
        if cfg.sample_rate == 0 {
            cfg.sample_rate = defaults.sample_rate;
        }
        if cfg.num_bands == 0 {
            cfg.num_bands = defaults.num_bands;
        }
        if cfg.frame_length < 2 {
            cfg.frame_length = defaults.frame_length;
        }
        if cfg.frame_shift == 0 {
            cfg.frame_shift = defaults.frame_shift;
        }
        if cfg.min_frames == 0 {
            cfg.min_frames = defaults.min_frames;
        }
        let nyquist = cfg.sample_rate as f64 / 2.0;
        if cfg.high_freq <= 0.0 || cfg.high_freq > nyquist {
            cfg.high_freq = nyquist - 800.0;
        }
        if cfg.low_freq < 0.0 || cfg.low_freq >= cfg.high_freq {
            cfg.low_freq = defaults.low_freq;
        }

        let fft_size = next_pow2(cfg.frame_length);
        let window = hamming_window(cfg.frame_length);
        let filterbank = band_filters(
            cfg.num_bands,
            fft_size,
            cfg.sample_rate,
            cfg.low_freq,
            cfg.high_freq,
        );
        Self {
            cfg,
            fft_size,
            window,
            filterbank,
        }
    }

    fn min_samples(&self) -> usize {
        self.cfg.frame_length + (self.cfg.min_frames - 1) * self.cfg.frame_shift
    }
}

impl Default for SpectralEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for SpectralEmbedder {
    fn embed(&self, samples: &[i16]) -> Result<Vec<f32>, SpeakerError> {
        if samples.len() < self.min_samples() {
            return Err(SpeakerError::TooShort(samples.len()));
        }

        let mut signal: Vec<f64> = samples.iter().map(|&s| s as f64 / 32768.0).collect();
        let energy: f64 = signal.iter().map(|v| v * v).sum();
        let rms = (energy / signal.len() as f64).sqrt();
        if rms < SILENCE_RMS {
            return Err(SpeakerError::Silent);
        }

        // Pre-emphasis over the whole signal.
        if self.cfg.pre_emphasis > 0.0 {
            for i in (1..signal.len()).rev() {
                signal[i] -= self.cfg.pre_emphasis * signal[i - 1];
            }
            signal[0] *= 1.0 - self.cfg.pre_emphasis;
        }

        let frame_len = self.cfg.frame_length;
        let num_frames = (signal.len() - frame_len) / self.cfg.frame_shift + 1;
        let half = self.fft_size / 2 + 1;

        let mut re = vec![0.0f64; self.fft_size];
        let mut im = vec![0.0f64; self.fft_size];
        let mut power = vec![0.0f64; half];
        let mut sum = vec![0.0f64; self.cfg.num_bands];
        let mut sum_sq = vec![0.0f64; self.cfg.num_bands];

        for f in 0..num_frames {
            let frame = &signal[f * self.cfg.frame_shift..f * self.cfg.frame_shift + frame_len];
            let mean = frame.iter().sum::<f64>() / frame_len as f64;

            re.fill(0.0);
            im.fill(0.0);
            for i in 0..frame_len {
                re[i] = (frame[i] - mean) * self.window[i];
            }
            fft_in_place(&mut re, &mut im);
            for k in 0..half {
                power[k] = re[k] * re[k] + im[k] * im[k];
            }

            for (b, filter) in self.filterbank.iter().enumerate() {
                let mut e = 0.0f64;
                for k in 0..half {
                    e += filter[k] * power[k];
                }
                let log_e = e.max(ENERGY_FLOOR).ln();
                sum[b] += log_e;
                sum_sq[b] += log_e * log_e;
            }
        }

        // Mean + std pooling over frames, then unit length.
        let n = num_frames as f64;
        let mut vector = Vec::with_capacity(2 * self.cfg.num_bands);
        for b in 0..self.cfg.num_bands {
            vector.push((sum[b] / n) as f32);
        }
        for b in 0..self.cfg.num_bands {
            let mean = sum[b] / n;
            let var = (sum_sq[b] / n - mean * mean).max(0.0);
            vector.push(var.sqrt() as f32);
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        2 * self.cfg.num_bands
    }
}

fn next_pow2(n: usize) -> usize {
    let mut p = 1;
    while p < n {
        p <<= 1;
    }
    p
}

fn hamming_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters on a mel-spaced grid, `[num_bands][fft_size/2 + 1]`.
fn band_filters(
    num_bands: usize,
    fft_size: usize,
    sample_rate: u32,
    low_freq: f64,
    high_freq: f64,
) -> Vec<Vec<f64>> {
    let half = fft_size / 2 + 1;
    let mel_low = hz_to_mel(low_freq);
    let mel_high = hz_to_mel(high_freq);

    let bins: Vec<usize> = (0..num_bands + 2)
        .map(|i| {
            let mel = mel_low + i as f64 * (mel_high - mel_low) / (num_bands + 1) as f64;
            let hz = mel_to_hz(mel);
            let bin = (hz * fft_size as f64 / sample_rate as f64).floor() as isize;
            bin.clamp(0, half as isize - 1) as usize
        })
        .collect();

    let mut filters = Vec::with_capacity(num_bands);
    for b in 0..num_bands {
        let (left, center, right) = (bins[b], bins[b + 1], bins[b + 2]);
        let mut filter = vec![0.0f64; half];
        if center > left {
            for k in left..=center {
                filter[k] = (k - left) as f64 / (center - left) as f64;
            }
        }
        if right > center {
            for k in center..=right {
                filter[k] = (right - k) as f64 / (right - center) as f64;
            }
        }
        filters.push(filter);
    }
    filters
}

/// In-place radix-2 Cooley-Tukey FFT over split real/imaginary buffers.
/// Both slices must share one power-of-two length.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let angle = -2.0 * PI / size as f64;
        let (wn_re, wn_im) = (angle.cos(), angle.sin());
        let mut start = 0;
        while start < n {
            let (mut w_re, mut w_im) = (1.0f64, 0.0f64);
            for k in 0..half {
                let (u_re, u_im) = (re[start + k], im[start + k]);
                let (v_re, v_im) = (re[start + k + half], im[start + k + half]);
                let t_re = w_re * v_re - w_im * v_im;
                let t_im = w_re * v_im + w_im * v_re;
                re[start + k] = u_re + t_re;
                im[start + k] = u_im + t_im;
                re[start + k + half] = u_re - t_re;
                im[start + k + half] = u_im - t_im;
                let next_re = w_re * wn_re - w_im * wn_im;
                let next_im = w_re * wn_im + w_im * wn_re;
                w_re = next_re;
                w_im = next_im;
            }
            start += size;
        }
        size <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{cosine_sim, l2_norm};

    fn tone(freq: f64, amplitude: f64, samples: usize) -> Vec<i16> {
        (0..samples)
            .map(|i| {
                let t = i as f64 / 16000.0;
                (amplitude * (2.0 * PI * freq * t).sin() * i16::MAX as f64) as i16
            })
            .collect()
    }

    fn pseudo_noise(samples: usize) -> Vec<i16> {
        // Deterministic LCG, loud enough to clear the silence gate.
        let mut state = 0x2545_f491u32;
        (0..samples)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((state >> 16) as i16) / 2
            })
            .collect()
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = SpectralEmbedder::new();
        let audio = tone(440.0, 0.4, 16000);
        let a = embedder.embed(&audio).unwrap();
        let b = embedder.embed(&audio).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_has_declared_dimension_and_unit_norm() {
        let embedder = SpectralEmbedder::new();
        let v = embedder.embed(&tone(440.0, 0.4, 16000)).unwrap();
        assert_eq!(v.len(), embedder.dimension());
        assert_eq!(v.len(), 48);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn same_content_beats_different_content() {
        let embedder = SpectralEmbedder::new();
        let a = embedder.embed(&tone(440.0, 0.4, 16000)).unwrap();
        let b = embedder.embed(&tone(440.0, 0.4, 16000)).unwrap();
        let c = embedder.embed(&pseudo_noise(16000)).unwrap();
        let same = cosine_sim(&a, &b);
        let different = cosine_sim(&a, &c);
        assert!(same > different, "same={} different={}", same, different);
        assert!(different < 1.0);
    }

    #[test]
    fn too_short_is_rejected() {
        let embedder = SpectralEmbedder::new();
        let err = embedder.embed(&tone(440.0, 0.4, 500)).unwrap_err();
        assert!(matches!(err, SpeakerError::TooShort(500)));
    }

    #[test]
    fn silence_is_rejected() {
        let embedder = SpectralEmbedder::new();
        let err = embedder.embed(&vec![0i16; 16000]).unwrap_err();
        assert!(matches!(err, SpeakerError::Silent));
    }

    #[test]
    fn fft_matches_known_spectrum() {
        // Unit impulse transforms to an all-ones spectrum.
        let mut re = vec![0.0f64; 8];
        let mut im = vec![0.0f64; 8];
        re[0] = 1.0;
        fft_in_place(&mut re, &mut im);
        for k in 0..8 {
            assert!((re[k] - 1.0).abs() < 1e-12);
            assert!(im[k].abs() < 1e-12);
        }
    }

    #[test]
    fn filters_cover_band_range() {
        let filters = band_filters(24, 512, 16000, 60.0, 7200.0);
        assert_eq!(filters.len(), 24);
        for filter in &filters {
            assert_eq!(filter.len(), 257);
            assert!(filter.iter().any(|&w| w > 0.0));
        }
    }
}
