//! Resolver behavior tests: classification priority, gating, eviction,
//! and determinism over realistic decision sequences.

use crate::{ContextLabel, Gate, SceneConfig, SceneResolver, VerificationDecision};
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

const DEVICE: &str = "board-01";
const TARGET: &str = "user-001";

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

fn verified(offset_secs: i64, duration_secs: u64) -> VerificationDecision {
    VerificationDecision {
        at: at(offset_secs),
        device_id: DEVICE.into(),
        claimed_user: TARGET.into(),
        best_match: Some(TARGET.into()),
        similarity: 0.9,
        verified: true,
        duration: Duration::from_secs(duration_secs),
    }
}

fn other_speaker(offset_secs: i64, duration_secs: u64, user: &str) -> VerificationDecision {
    VerificationDecision {
        best_match: Some(user.into()),
        similarity: 0.85,
        verified: false,
        ..verified(offset_secs, duration_secs)
    }
}

fn unidentified(offset_secs: i64, duration_secs: u64, similarity: f32) -> VerificationDecision {
    VerificationDecision {
        best_match: (similarity > 0.0).then(|| TARGET.to_string()),
        similarity,
        verified: false,
        ..verified(offset_secs, duration_secs)
    }
}

#[test]
fn all_target_window_is_solo_activity_and_passes() {
    let mut resolver = SceneResolver::new();
    let scene = resolver.resolve(verified(0, 10));
    assert_eq!(scene.context, ContextLabel::SoloActivity);
    assert_eq!(scene.gate, Gate::Pass);
    assert_eq!(scene.target_user_fraction, 1.0);
    assert_eq!(scene.distinct_speaker_count, 0);
}

#[test]
fn unverified_window_is_background_noise_and_blocks() {
    let mut resolver = SceneResolver::new();
    resolver.resolve(unidentified(0, 15, 0.2));
    resolver.resolve(unidentified(20, 15, 0.3));
    let scene = resolver.resolve(unidentified(40, 15, 0.1));
    assert_eq!(scene.context, ContextLabel::BackgroundNoiseTv);
    assert_eq!(scene.gate, Gate::Block);
    assert_eq!(scene.target_user_fraction, 0.0);
}

#[test]
fn mixed_speakers_window_is_social_interaction() {
    let mut resolver = SceneResolver::new();
    resolver.resolve(verified(0, 20));
    resolver.resolve(other_speaker(20, 20, "user-002"));
    let scene = resolver.resolve(unidentified(40, 20, 0.6));
    // Target 20s, other 20s, unidentified 20s of 60s: neither ratio is met.
    assert_eq!(scene.context, ContextLabel::SocialInteraction);
    assert_eq!(scene.gate, Gate::Block);
    assert!((scene.target_user_fraction - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!(scene.distinct_speaker_count, 1);
}

#[test]
fn ambiguous_similarity_counts_as_unidentified_not_target() {
    let mut resolver = SceneResolver::new();
    // Score in the ambiguous band for the claimed user: never verified,
    // and its duration weighs toward background noise.
    let scene = resolver.resolve(unidentified(0, 10, 0.60));
    assert_eq!(scene.context, ContextLabel::BackgroundNoiseTv);
    assert_eq!(scene.gate, Gate::Block);
    assert_eq!(scene.target_user_fraction, 0.0);
}

#[test]
fn below_both_ratios_is_social_interaction() {
    let mut resolver = SceneResolver::new();
    // Target 40%, unidentified 30%, other 30%: exhaustive third arm.
    resolver.resolve(verified(0, 4));
    resolver.resolve(other_speaker(5, 3, "user-002"));
    let scene = resolver.resolve(unidentified(10, 3, 0.6));
    assert_eq!(scene.context, ContextLabel::SocialInteraction);
}

#[test]
fn target_fraction_at_ratio_boundary_is_solo_activity() {
    let mut resolver = SceneResolver::new();
    resolver.resolve(verified(0, 10));
    let scene = resolver.resolve(other_speaker(15, 10, "user-002"));
    // Exactly half the window is the target: >= wins.
    assert_eq!(scene.context, ContextLabel::SoloActivity);
    assert_eq!(scene.gate, Gate::Pass);
}

#[test]
fn old_target_speech_ages_out_of_the_window() {
    let mut resolver = SceneResolver::new();
    let scene = resolver.resolve(verified(0, 10));
    assert_eq!(scene.context, ContextLabel::SoloActivity);
    // 90 seconds later the verified speech is gone; only noise remains.
    let scene = resolver.resolve(unidentified(90, 5, 0.2));
    assert_eq!(scene.context, ContextLabel::BackgroundNoiseTv);
    let window = resolver.window(DEVICE).unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window.oldest_at(), Some(at(90)));
}

#[test]
fn replay_produces_identical_decisions() {
    let sequence: Vec<VerificationDecision> = vec![
        verified(0, 8),
        unidentified(10, 4, 0.3),
        other_speaker(18, 6, "user-002"),
        verified(30, 12),
        unidentified(45, 5, 0.65),
        other_speaker(70, 9, "user-003"),
        verified(95, 7),
    ];
    let mut first = SceneResolver::new();
    let mut second = SceneResolver::new();
    let a: Vec<_> = sequence.iter().cloned().map(|d| first.resolve(d)).collect();
    let b: Vec<_> = sequence.into_iter().map(|d| second.resolve(d)).collect();
    assert_eq!(a, b);
}

#[test]
fn devices_have_independent_windows() {
    let mut resolver = SceneResolver::new();
    resolver.resolve(verified(0, 10));
    let mut noisy = unidentified(1, 10, 0.2);
    noisy.device_id = "board-02".into();
    let scene = resolver.resolve(noisy);
    // board-02's noise does not dilute board-01's window.
    assert_eq!(scene.device_id, "board-02");
    assert_eq!(scene.context, ContextLabel::BackgroundNoiseTv);
    let scene = resolver.resolve(verified(2, 10));
    assert_eq!(scene.context, ContextLabel::SoloActivity);
}

#[test]
fn remove_device_forgets_history() {
    let mut resolver = SceneResolver::new();
    resolver.resolve(verified(0, 10));
    assert!(resolver.window(DEVICE).is_some());
    resolver.remove_device(DEVICE);
    assert!(resolver.window(DEVICE).is_none());
}

#[test]
fn zero_duration_decision_defaults_to_background_noise() {
    let mut resolver = SceneResolver::new();
    // A dropped utterance with no measurable audio still yields a logged,
    // blocking decision.
    let scene = resolver.resolve(VerificationDecision {
        duration: Duration::ZERO,
        best_match: None,
        similarity: 0.0,
        verified: false,
        ..verified(0, 0)
    });
    assert_eq!(scene.context, ContextLabel::BackgroundNoiseTv);
    assert_eq!(scene.gate, Gate::Block);
}

#[test]
fn custom_ratios_change_the_verdict() {
    let mut resolver = SceneResolver::with_config(SceneConfig {
        solo_activity_ratio: 0.9,
        ..SceneConfig::default()
    });
    resolver.resolve(verified(0, 8));
    let scene = resolver.resolve(other_speaker(10, 2, "user-002"));
    // 80% target would be solo under the default 0.5 ratio, not under 0.9.
    assert_eq!(scene.context, ContextLabel::SocialInteraction);
}
