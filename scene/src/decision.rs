//! Decision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Ambient context classified from one device's recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextLabel {
    /// The assigned user speaking alone.
    SoloActivity,
    /// Mixed speakers around the device.
    SocialInteraction,
    /// Unidentified speech dominates: TV, radio, ambient chatter.
    #[default]
    BackgroundNoiseTv,
}

impl ContextLabel {
    /// Returns the string representation of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextLabel::SoloActivity => "solo_activity",
            ContextLabel::SocialInteraction => "social_interaction",
            ContextLabel::BackgroundNoiseTv => "background_noise_tv",
        }
    }

    /// Parses a label from a string. Unknown strings map to the
    /// conservative default, `background_noise_tv`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "solo_activity" => ContextLabel::SoloActivity,
            "social_interaction" => ContextLabel::SocialInteraction,
            _ => ContextLabel::BackgroundNoiseTv,
        }
    }

    /// Returns the gate this context implies: only solo activity lets
    /// audio proceed downstream.
    pub fn gate(&self) -> Gate {
        match self {
            ContextLabel::SoloActivity => Gate::Pass,
            _ => Gate::Block,
        }
    }
}

impl fmt::Display for ContextLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ContextLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContextLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ContextLabel::from_str(&s))
    }
}

/// Whether an utterance's audio proceeds downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gate {
    Pass,
    #[default]
    Block,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Pass => "pass",
            Gate::Block => "block",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pass" => Gate::Pass,
            _ => Gate::Block,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Gate::Pass)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Gate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Gate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Gate::from_str(&s))
    }
}

/// Outcome of verifying one utterance against the enrolled profiles.
///
/// A dropped utterance (embedding failure, dangling bytes) still produces a
/// record with `verified = false`, so the window never silently loses time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDecision {
    /// When the utterance started.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    /// The device that produced the utterance.
    pub device_id: String,
    /// The user assigned to the device.
    pub claimed_user: String,
    /// Best-matching enrolled user, if any profile was scanned.
    pub best_match: Option<String>,
    /// Cosine similarity of the best match (0 when no match was possible).
    pub similarity: f32,
    /// True only when similarity cleared the high threshold and the best
    /// match is the claimed user.
    pub verified: bool,
    /// Speech duration covered by the utterance.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// One window classification, appended to the scene log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDecision {
    /// Window end: the timestamp of the decision that triggered it.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub device_id: String,
    pub context: ContextLabel,
    pub gate: Gate,
    /// Fraction of retained speech attributed to the assigned user.
    pub target_user_fraction: f32,
    /// Distinct non-target enrolled users heard in the window.
    pub distinct_speaker_count: usize,
}

/// Durations ride the wire as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
