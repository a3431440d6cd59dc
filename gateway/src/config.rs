//! Gateway configuration.

use std::time::Duration;

use auris_audio::{Format, NoiseFloorConfig};
use auris_scene::SceneConfig;
use serde::{Deserialize, Serialize};

/// Gateway configuration.
///
/// All fields have defaults tuned for the wearable boards, so a config file
/// only needs to name the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address (host:port).
    pub listen_addr: String,
    /// Sample rate of the inbound PCM stream.
    pub sample_rate: u32,
    /// Samples per analysis chunk.
    pub chunk_samples: usize,
    /// Seconds a device may take to identify itself.
    pub handshake_timeout_secs: u64,
    /// Seconds to wait per read slice while no utterance is open.
    pub read_timeout_secs: u64,
    /// Seconds of total inactivity before a keep-alive probe.
    pub idle_ceiling_secs: u64,
    /// Seconds a probed device has to send anything back.
    pub probe_timeout_secs: u64,
    /// Milliseconds of receive silence that seal an utterance.
    pub utterance_gap_ms: u64,
    /// Cap on a single utterance; longer speech is split.
    pub max_utterance_secs: u64,
    /// Lowest RMS the noise floor may settle at.
    pub noise_floor_min: f32,
    /// Smoothing factor for noise floor updates.
    pub noise_floor_alpha: f32,
    /// Chunks observed before the noise floor is trusted.
    pub noise_warmup_chunks: usize,
    /// Similarity at or above which a claimed speaker is verified.
    pub similarity_threshold_high: f32,
    /// Similarity at or above which an unverified match is still notable.
    pub similarity_threshold_low: f32,
    /// Scene window span in seconds.
    pub window_duration_seconds: u64,
    /// Verified-speech fraction that makes a window solo activity.
    pub solo_activity_ratio: f32,
    /// Unidentified-speech fraction that makes a window background noise.
    pub background_noise_ratio: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let scene = SceneConfig::default();
        let noise = NoiseFloorConfig::default();
        Self {
            listen_addr: "0.0.0.0:8010".to_string(),
            sample_rate: 16_000,
            chunk_samples: 2048,
            handshake_timeout_secs: 10,
            read_timeout_secs: 15,
            idle_ceiling_secs: 180,
            probe_timeout_secs: 10,
            utterance_gap_ms: 800,
            max_utterance_secs: 20,
            noise_floor_min: noise.min_floor,
            noise_floor_alpha: noise.alpha,
            noise_warmup_chunks: noise.warmup_chunks,
            similarity_threshold_high: scene.similarity_threshold_high,
            similarity_threshold_low: scene.similarity_threshold_low,
            window_duration_seconds: scene.window_duration.as_secs(),
            solo_activity_ratio: scene.solo_activity_ratio,
            background_noise_ratio: scene.background_noise_ratio,
        }
    }
}

impl GatewayConfig {
    /// PCM format of the inbound stream.
    pub fn format(&self) -> Format {
        Format::new(self.sample_rate)
    }

    /// Bytes per analysis chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_samples * auris_audio::SAMPLE_BYTES
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn idle_ceiling(&self) -> Duration {
        Duration::from_secs(self.idle_ceiling_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn utterance_gap(&self) -> Duration {
        Duration::from_millis(self.utterance_gap_ms)
    }

    pub fn max_utterance(&self) -> Duration {
        Duration::from_secs(self.max_utterance_secs)
    }

    /// Scene classification knobs in the form the resolver takes.
    pub fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            similarity_threshold_high: self.similarity_threshold_high,
            similarity_threshold_low: self.similarity_threshold_low,
            window_duration: Duration::from_secs(self.window_duration_seconds),
            solo_activity_ratio: self.solo_activity_ratio,
            background_noise_ratio: self.background_noise_ratio,
        }
        .normalized()
    }

    /// Noise floor knobs in the form the quality monitor takes.
    pub fn noise_config(&self) -> NoiseFloorConfig {
        NoiseFloorConfig {
            min_floor: self.noise_floor_min,
            alpha: self.noise_floor_alpha,
            warmup_chunks: self.noise_warmup_chunks,
        }
    }

    /// Replaces zero-valued timing and sizing fields with their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.sample_rate == 0 {
            self.sample_rate = defaults.sample_rate;
        }
        if self.chunk_samples == 0 {
            self.chunk_samples = defaults.chunk_samples;
        }
        if self.handshake_timeout_secs == 0 {
            self.handshake_timeout_secs = defaults.handshake_timeout_secs;
        }
        if self.read_timeout_secs == 0 {
            self.read_timeout_secs = defaults.read_timeout_secs;
        }
        if self.idle_ceiling_secs == 0 {
            self.idle_ceiling_secs = defaults.idle_ceiling_secs;
        }
        if self.probe_timeout_secs == 0 {
            self.probe_timeout_secs = defaults.probe_timeout_secs;
        }
        if self.utterance_gap_ms == 0 {
            self.utterance_gap_ms = defaults.utterance_gap_ms;
        }
        if self.max_utterance_secs == 0 {
            self.max_utterance_secs = defaults.max_utterance_secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_whole_surface() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8010");
        assert_eq!(cfg.chunk_bytes(), 4096);
        assert_eq!(cfg.format().sample_rate, 16_000);
        assert_eq!(cfg.utterance_gap(), Duration::from_millis(800));
        assert_eq!(cfg.max_utterance(), Duration::from_secs(20));
        assert_eq!(cfg.idle_ceiling(), Duration::from_secs(180));
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: GatewayConfig = serde_yaml::from_str(
            "listen_addr: \"127.0.0.1:9000\"\nutterance_gap_ms: 500\n",
        )
        .unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.utterance_gap_ms, 500);
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.read_timeout_secs, 15);
    }

    #[test]
    fn normalized_restores_zeroed_fields() {
        let cfg = GatewayConfig {
            chunk_samples: 0,
            utterance_gap_ms: 0,
            ..GatewayConfig::default()
        }
        .normalized();
        assert_eq!(cfg.chunk_samples, 2048);
        assert_eq!(cfg.utterance_gap_ms, 800);
    }

    #[test]
    fn scene_config_inherits_thresholds() {
        let cfg = GatewayConfig {
            similarity_threshold_high: 0.8,
            similarity_threshold_low: 0.9,
            ..GatewayConfig::default()
        };
        let scene = cfg.scene_config();
        assert_eq!(scene.similarity_threshold_high, 0.8);
        // An inverted low threshold falls back to the default.
        assert_eq!(scene.similarity_threshold_low, 0.55);
    }
}
