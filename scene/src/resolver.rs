//! Window classification and gating.

use crate::decision::{ContextLabel, SceneDecision, VerificationDecision};
use crate::window::{SceneWindow, WindowStats};
use std::collections::HashMap;
use std::time::Duration;

/// Thresholds for verification and window classification.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Similarity at or above which a best match is confident (default: 0.75).
    pub similarity_threshold_high: f32,
    /// Similarity below which a best match is no match at all; scores in
    /// `[low, high)` are ambiguous (default: 0.55).
    pub similarity_threshold_low: f32,
    /// Trailing window span (default: 60s).
    pub window_duration: Duration,
    /// Target-user fraction at or above which the window is solo activity
    /// (default: 0.5).
    pub solo_activity_ratio: f32,
    /// Unidentified fraction at or above which the window is background
    /// noise (default: 0.7).
    pub background_noise_ratio: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            similarity_threshold_high: 0.75,
            similarity_threshold_low: 0.55,
            window_duration: Duration::from_secs(60),
            solo_activity_ratio: 0.5,
            background_noise_ratio: 0.7,
        }
    }
}

impl SceneConfig {
    /// Clamps out-of-range values back to their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = SceneConfig::default();
        if !(0.0..=1.0).contains(&self.similarity_threshold_high) {
            self.similarity_threshold_high = defaults.similarity_threshold_high;
        }
        if self.similarity_threshold_low < 0.0
            || self.similarity_threshold_low > self.similarity_threshold_high
        {
            self.similarity_threshold_low = defaults
                .similarity_threshold_low
                .min(self.similarity_threshold_high);
        }
        if self.window_duration.is_zero() {
            self.window_duration = defaults.window_duration;
        }
        if !(0.0..=1.0).contains(&self.solo_activity_ratio) || self.solo_activity_ratio == 0.0 {
            self.solo_activity_ratio = defaults.solo_activity_ratio;
        }
        if !(0.0..=1.0).contains(&self.background_noise_ratio) || self.background_noise_ratio == 0.0
        {
            self.background_noise_ratio = defaults.background_noise_ratio;
        }
        self
    }
}

/// Folds verification decisions into per-device windows and classifies them.
///
/// Replaying an identical decision sequence into a fresh resolver yields an
/// identical scene-decision sequence; nothing here depends on wall-clock
/// time or iteration order.
pub struct SceneResolver {
    cfg: SceneConfig,
    windows: HashMap<String, SceneWindow>,
}

impl SceneResolver {
    /// Creates a resolver with default configuration.
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Creates a resolver with the given configuration.
    pub fn with_config(cfg: SceneConfig) -> Self {
        Self {
            cfg: cfg.normalized(),
            windows: HashMap::new(),
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &SceneConfig {
        &self.cfg
    }

    /// Folds one verification decision into its device's window and returns
    /// the resulting scene classification.
    pub fn resolve(&mut self, decision: VerificationDecision) -> SceneDecision {
        let at = decision.at;
        let device_id = decision.device_id.clone();
        let window = self
            .windows
            .entry(device_id.clone())
            .or_insert_with(|| SceneWindow::new(self.cfg.window_duration));
        window.push(decision);
        let stats = window.stats(self.cfg.similarity_threshold_high);
        let (context, target_user_fraction) = classify(&stats, &self.cfg);
        let scene = SceneDecision {
            at,
            device_id,
            context,
            gate: context.gate(),
            target_user_fraction,
            distinct_speaker_count: stats.distinct_speakers,
        };
        tracing::debug!(
            "scene {}: {} gate={} target={:.2} speakers={}",
            scene.device_id,
            scene.context,
            scene.gate,
            scene.target_user_fraction,
            scene.distinct_speaker_count
        );
        scene
    }

    /// Returns a device's window, if it has produced any decisions.
    pub fn window(&self, device_id: &str) -> Option<&SceneWindow> {
        self.windows.get(device_id)
    }

    /// Drops a device's window state on session teardown.
    pub fn remove_device(&mut self, device_id: &str) {
        self.windows.remove(device_id);
    }
}

impl Default for SceneResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the fixed-priority classification rule.
///
/// Fractions are relative to the total utterance duration retained in the
/// window. An empty (or zero-duration) window is background noise: a device
/// that just connected has earned no trust yet.
fn classify(stats: &WindowStats, cfg: &SceneConfig) -> (ContextLabel, f32) {
    let total = stats.total.as_secs_f32();
    if total <= 0.0 {
        return (ContextLabel::BackgroundNoiseTv, 0.0);
    }
    let target_fraction = stats.target.as_secs_f32() / total;
    if target_fraction >= cfg.solo_activity_ratio {
        return (ContextLabel::SoloActivity, target_fraction);
    }
    if stats.unidentified.as_secs_f32() / total >= cfg.background_noise_ratio {
        return (ContextLabel::BackgroundNoiseTv, target_fraction);
    }
    (ContextLabel::SocialInteraction, target_fraction)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_window_classifies_as_background_noise() {
        let stats = WindowStats::default();
        let (context, fraction) = classify(&stats, &SceneConfig::default());
        assert_eq!(context, ContextLabel::BackgroundNoiseTv);
        assert_eq!(fraction, 0.0);
    }

    #[test]
    fn config_normalization_restores_defaults() {
        let cfg = SceneConfig {
            similarity_threshold_high: 1.5,
            similarity_threshold_low: -0.2,
            window_duration: Duration::ZERO,
            solo_activity_ratio: 0.0,
            background_noise_ratio: 3.0,
        }
        .normalized();
        let defaults = SceneConfig::default();
        assert_eq!(cfg.similarity_threshold_high, defaults.similarity_threshold_high);
        assert_eq!(cfg.similarity_threshold_low, defaults.similarity_threshold_low);
        assert_eq!(cfg.window_duration, defaults.window_duration);
        assert_eq!(cfg.solo_activity_ratio, defaults.solo_activity_ratio);
        assert_eq!(cfg.background_noise_ratio, defaults.background_noise_ratio);
    }

    #[test]
    fn low_threshold_never_exceeds_high() {
        let cfg = SceneConfig {
            similarity_threshold_high: 0.4,
            similarity_threshold_low: 0.9,
            ..SceneConfig::default()
        }
        .normalized();
        assert!(cfg.similarity_threshold_low <= cfg.similarity_threshold_high);
    }
}
